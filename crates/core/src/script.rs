//! Test-script scanning for `list`/`load`.
//!
//! Recovers test declarations from generated script source without running
//! it: `test('title', ...)` headers plus any `test.use({...})` options block
//! in force at that point. The scan is tolerant by design - surrounding
//! prose is ignored and malformed input yields an empty list, never an
//! error, because listing must not execute or validate the script.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use tabwire_protocol::{SourceLocation, TestDescriptor, TestOptions};

/// Synthetic file name reported for in-memory script source.
pub const SCRIPT_FILE: &str = "script.spec.ts";

static TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r#"\btest\s*\(\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)"|`((?:[^`\\]|\\.)*)`)"#,
	)
	.unwrap()
});
static USE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\btest\s*\.\s*use\s*\(").unwrap());
static DEVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"deviceName\s*:\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#).unwrap()
});
static CONTEXT_OPTIONS_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"contextOptions\s*:").unwrap());
static BARE_KEY_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_$][\w$]*)\s*:"#).unwrap());
static SINGLE_QUOTED_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"'((?:[^'\\]|\\.)*)'").unwrap());
static TRAILING_COMMA_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Scans `code` for test declarations, in source order.
pub fn parse_tests(code: &str) -> Vec<TestDescriptor> {
	let use_blocks = scan_use_blocks(code);
	TEST_RE
		.captures_iter(code)
		.filter_map(|caps| {
			let m = caps.get(0)?;
			let title = caps
				.get(1)
				.or_else(|| caps.get(2))
				.or_else(|| caps.get(3))?;
			let (line, column) = position(code, m.start());
			// The options block in force is the last `test.use` above this
			// declaration.
			let options = use_blocks
				.iter()
				.rev()
				.find(|(offset, _)| *offset < m.start())
				.map(|(_, options)| options.clone());
			Some(TestDescriptor {
				title: unescape(title.as_str()),
				options,
				location: Some(SourceLocation {
					file: SCRIPT_FILE.to_string(),
					line: Some(line),
					column: Some(column),
				}),
			})
		})
		.collect()
}

fn scan_use_blocks(code: &str) -> Vec<(usize, TestOptions)> {
	USE_RE
		.find_iter(code)
		.filter_map(|m| {
			let open = m.end() - 1;
			let body = balanced_slice(code, open, '(', ')')?;
			let device_name = DEVICE_RE.captures(body).and_then(|caps| {
				caps.get(1)
					.or_else(|| caps.get(2))
					.map(|raw| unescape(raw.as_str()))
			});
			let context_options = CONTEXT_OPTIONS_RE
				.find(body)
				.and_then(|key| {
					let brace = body[key.end()..].find('{')? + key.end();
					balanced_slice(body, brace, '{', '}')
				})
				.and_then(|inner| object_literal_to_json(&format!("{{{inner}}}")))
				.unwrap_or(Value::Null);
			if device_name.is_none() && context_options.is_null() {
				return None;
			}
			Some((
				m.start(),
				TestOptions {
					device_name,
					context_options,
				},
			))
		})
		.collect()
}

/// Content between the delimiter at `open` and its balanced close, tracking
/// nesting and skipping string literals.
fn balanced_slice(code: &str, open: usize, open_ch: char, close_ch: char) -> Option<&str> {
	let bytes = code.as_bytes();
	if bytes.get(open) != Some(&(open_ch as u8)) {
		return None;
	}
	let mut depth = 0usize;
	let mut quote: Option<u8> = None;
	let mut escaped = false;
	for (i, &b) in bytes.iter().enumerate().skip(open) {
		if let Some(q) = quote {
			if escaped {
				escaped = false;
			} else if b == b'\\' {
				escaped = true;
			} else if b == q {
				quote = None;
			}
			continue;
		}
		match b {
			b'\'' | b'"' | b'`' => quote = Some(b),
			_ if b == open_ch as u8 => depth += 1,
			_ if b == close_ch as u8 => {
				depth -= 1;
				if depth == 0 {
					return Some(&code[open + 1..i]);
				}
			}
			_ => {}
		}
	}
	None
}

/// Best-effort conversion of a JS object literal to JSON: quotes bare keys,
/// rewrites single-quoted strings, strips trailing commas.
fn object_literal_to_json(src: &str) -> Option<Value> {
	let keyed = BARE_KEY_RE.replace_all(src, "${1}\"${2}\":");
	let quoted = SINGLE_QUOTED_RE.replace_all(&keyed, |caps: &Captures<'_>| {
		format!("\"{}\"", caps[1].replace('"', "\\\""))
	});
	let trimmed = TRAILING_COMMA_RE.replace_all(&quoted, "$1");
	serde_json::from_str(&trimmed).ok()
}

fn position(code: &str, offset: usize) -> (u32, u32) {
	let before = &code[..offset];
	let line = before.matches('\n').count() as u32 + 1;
	let column = (offset - before.rfind('\n').map(|i| i + 1).unwrap_or(0)) as u32 + 1;
	(line, column)
}

fn unescape(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	let mut chars = raw.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some('n') => out.push('\n'),
			Some('t') => out.push('\t'),
			Some(other) => out.push(other),
			None => out.push('\\'),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn finds_titles_with_one_based_locations() {
		let code = "import { test } from './fixtures';\n\ntest('logs in', async ({ page }) => {\n});\n  test(\"logs out\", async () => {});\n";
		let tests = parse_tests(code);
		assert_eq!(tests.len(), 2);
		assert_eq!(tests[0].title, "logs in");
		let location = tests[0].location.as_ref().unwrap();
		assert_eq!(location.file, SCRIPT_FILE);
		assert_eq!(location.line, Some(3));
		assert_eq!(location.column, Some(1));
		assert_eq!(tests[1].title, "logs out");
		assert_eq!(tests[1].location.as_ref().unwrap().line, Some(5));
		assert_eq!(tests[1].location.as_ref().unwrap().column, Some(3));
	}

	#[test]
	fn use_block_applies_to_following_tests() {
		let code = "test('before', () => {});\ntest.use({ deviceName: 'iPhone 12' });\ntest('after', () => {});\n";
		let tests = parse_tests(code);
		assert_eq!(tests.len(), 2);
		assert!(tests[0].options.is_none());
		let options = tests[1].options.as_ref().unwrap();
		assert_eq!(options.device_name.as_deref(), Some("iPhone 12"));
	}

	#[test]
	fn context_options_survive_js_literal_syntax() {
		let code = "test.use({\n  deviceName: \"Pixel 7\",\n  contextOptions: { viewport: { width: 1280, height: 720, }, hasTouch: true },\n});\ntest('mobile flow', () => {});\n";
		let tests = parse_tests(code);
		assert_eq!(tests.len(), 1);
		let options = tests[0].options.as_ref().unwrap();
		assert_eq!(options.device_name.as_deref(), Some("Pixel 7"));
		assert_eq!(
			options.context_options,
			json!({ "viewport": { "width": 1280, "height": 720 }, "hasTouch": true })
		);
	}

	#[test]
	fn escaped_quotes_in_titles() {
		let tests = parse_tests(r#"test('it\'s fine', () => {});"#);
		assert_eq!(tests.len(), 1);
		assert_eq!(tests[0].title, "it's fine");
	}

	#[test]
	fn malformed_input_yields_empty_list() {
		assert!(parse_tests("").is_empty());
		assert!(parse_tests("not a script at all").is_empty());
		assert!(parse_tests("test(").is_empty());
		// Unterminated use block does not break the title scan.
		let tests = parse_tests("test.use({ deviceName: 'x'\ntest('still found', () => {});");
		assert_eq!(tests.len(), 1);
		assert_eq!(tests[0].title, "still found");
	}

	#[test]
	fn does_not_mistake_use_for_a_declaration() {
		let tests = parse_tests("test.use({ deviceName: 'iPad' });\n");
		assert!(tests.is_empty());
	}
}
