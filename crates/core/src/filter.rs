//! Tab attribute matching for bulk attach.

use glob::Pattern;

use tabwire_protocol::{TabFilter, TabInfo};

/// Whether `tab` satisfies every attribute constraint in `filter`.
///
/// The filter is a conjunction; an empty filter matches every tab. `title`
/// is a single glob pattern, `url` is a list of glob patterns of which any
/// one may match.
pub fn tab_matches(filter: &TabFilter, tab: &TabInfo) -> bool {
	if let Some(status) = filter.status {
		if tab.status != status {
			return false;
		}
	}
	if let Some(last_focused) = filter.last_focused_window {
		if tab.last_focused_window != last_focused {
			return false;
		}
	}
	// The engine boundary reports one focus bit per tab; the current-window
	// constraint resolves against the same bit.
	if let Some(current) = filter.current_window {
		if tab.last_focused_window != current {
			return false;
		}
	}
	if let Some(window_id) = filter.window_id {
		if tab.window_id != window_id {
			return false;
		}
	}
	if let Some(window_type) = filter.window_type {
		if tab.window_type != window_type {
			return false;
		}
	}
	if let Some(active) = filter.active {
		if tab.active != active {
			return false;
		}
	}
	if let Some(index) = filter.index {
		if tab.index != index {
			return false;
		}
	}
	if let Some(highlighted) = filter.highlighted {
		if tab.highlighted != highlighted {
			return false;
		}
	}
	if let Some(discarded) = filter.discarded {
		if tab.discarded != discarded {
			return false;
		}
	}
	if let Some(auto_discardable) = filter.auto_discardable {
		if tab.auto_discardable != auto_discardable {
			return false;
		}
	}
	if let Some(pinned) = filter.pinned {
		if tab.pinned != pinned {
			return false;
		}
	}
	if let Some(audible) = filter.audible {
		if tab.audible != audible {
			return false;
		}
	}
	if let Some(muted) = filter.muted {
		if tab.muted != muted {
			return false;
		}
	}
	if let Some(group_id) = filter.group_id {
		if tab.group_id != group_id {
			return false;
		}
	}
	if let Some(title) = &filter.title {
		if !glob_matches(title, &tab.title) {
			return false;
		}
	}
	if let Some(patterns) = &filter.url {
		if !patterns.iter().any(|pattern| glob_matches(pattern, &tab.url)) {
			return false;
		}
	}
	true
}

fn glob_matches(pattern: &str, value: &str) -> bool {
	match Pattern::new(pattern) {
		Ok(pattern) => pattern.matches(value),
		// Invalid pattern falls back to an exact string match.
		Err(_) => pattern == value,
	}
}
