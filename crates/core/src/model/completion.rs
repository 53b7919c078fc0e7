/// Tooltip applied to a completion control once its video requirement is met.
pub const READY_TITLE: &str = "Mark task as complete";

/// Rewrites a "watch required" label into its ready-to-complete form.
///
/// Returns `None` when the label does not mention a watch requirement and
/// should be left as is.
#[must_use]
pub fn ready_label(current: &str) -> Option<String> {
    if !current.contains("Watch") {
        return None;
    }
    let label = if current.contains("Complete Task") {
        "✓ Complete Task"
    } else {
        "✓ Complete"
    };
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_label_keeps_task_wording() {
        assert_eq!(
            ready_label("Watch video to Complete Task").as_deref(),
            Some("✓ Complete Task")
        );
    }

    #[test]
    fn short_label_becomes_complete() {
        assert_eq!(ready_label("Watch first").as_deref(), Some("✓ Complete"));
    }

    #[test]
    fn unrelated_label_is_untouched() {
        assert_eq!(ready_label("✓ Complete"), None);
    }
}
