/// Row styling for diff statuses.
///
/// Frontends map each [`Tone`] to a concrete colour; the rest of the view
/// code only refers to these semantic values.
use dircomp_core::model::DiffStatus;

/// Semantic colour of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Identical entries.
    Muted,
    /// Present only on the left.
    Left,
    /// Present only on the right.
    Right,
    /// Content differs.
    Changed,
    /// A directory with a difference somewhere below it.
    Contains,
    Error,
    /// Not settled yet.
    Busy,
}

/// Marker character and tone for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowStyle {
    pub marker: char,
    pub tone: Tone,
}

pub fn style_for(status: DiffStatus) -> RowStyle {
    let (marker, tone) = match status {
        DiffStatus::Identical => ('=', Tone::Muted),
        DiffStatus::OnlyLeft => ('<', Tone::Left),
        DiffStatus::OnlyRight => ('>', Tone::Right),
        DiffStatus::ContentDifferent => ('!', Tone::Changed),
        DiffStatus::ContainsDifference => ('~', Tone::Contains),
        DiffStatus::Error => ('E', Tone::Error),
        DiffStatus::Pending | DiffStatus::Scanning => ('?', Tone::Busy),
    };
    RowStyle { marker, tone }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_difference_has_a_distinct_marker() {
        let markers: std::collections::HashSet<char> = [
            DiffStatus::Identical,
            DiffStatus::OnlyLeft,
            DiffStatus::OnlyRight,
            DiffStatus::ContentDifferent,
            DiffStatus::ContainsDifference,
            DiffStatus::Error,
        ]
        .into_iter()
        .map(|s| style_for(s).marker)
        .collect();
        assert_eq!(markers.len(), 6);
        assert_eq!(style_for(DiffStatus::Scanning), style_for(DiffStatus::Pending));
    }
}
