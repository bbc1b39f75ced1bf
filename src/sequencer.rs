//! Message sequencer.
//!
//! Turns raw multi-line text plus two name tokens into the ordered list of
//! rendered messages a task cycles through. The list is built once per task
//! and never changes afterwards.

/// Why a sequence came out empty without the input being invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingInputWarning {
    /// No raw message text was supplied.
    MessageText,
    /// The leading name token is missing or blank.
    LeadingName,
    /// The trailing name token is missing or blank.
    TrailingName,
}

impl std::fmt::Display for MissingInputWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageText => write!(f, "message text is missing"),
            Self::LeadingName => write!(f, "leading name is missing"),
            Self::TrailingName => write!(f, "trailing name is missing"),
        }
    }
}

/// Output of [`render_messages`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedSequence {
    pub messages: Vec<String>,
    pub warning: Option<MissingInputWarning>,
}

/// Render `raw` into `"<leading> <line> <trailing>"` entries.
///
/// Lines are split on `\n`, stripped of a trailing `\r`, trimmed, and
/// dropped when empty.
#[must_use]
pub fn render_messages(
    raw: Option<&str>,
    leading: Option<&str>,
    trailing: Option<&str>,
) -> RenderedSequence {
    let Some(raw) = raw else {
        return RenderedSequence::missing(MissingInputWarning::MessageText);
    };
    let Some(leading) = leading.filter(|name| !name.trim().is_empty()) else {
        return RenderedSequence::missing(MissingInputWarning::LeadingName);
    };
    let Some(trailing) = trailing.filter(|name| !name.trim().is_empty()) else {
        return RenderedSequence::missing(MissingInputWarning::TrailingName);
    };

    let messages = raw
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).trim())
        .filter(|line| !line.is_empty())
        .map(|line| format!("{leading} {line} {trailing}"))
        .collect();

    RenderedSequence {
        messages,
        warning: None,
    }
}

impl RenderedSequence {
    fn missing(warning: MissingInputWarning) -> Self {
        Self {
            messages: Vec::new(),
            warning: Some(warning),
        }
    }
}
