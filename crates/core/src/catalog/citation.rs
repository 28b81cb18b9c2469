//! Display names for catalog items, derived from bibliographic fields.

/// Placeholder for a missing first-author last name.
pub const NO_LAST_NAME: &str = "NOLAST";

/// Placeholder for a missing title.
pub const NO_TITLE: &str = "NOTITLE";

/// Titles are cut to this many characters.
pub const TITLE_MAX_CHARS: usize = 70;

/// The bibliographic fields a display name is built from. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMetadata {
    pub author_first: Option<String>,
    pub author_last: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub year: Option<String>,
}

impl ItemMetadata {
    /// `<Last> <Initials> - <Title>[ - <Journal>][ - <Year>]`.
    ///
    /// The last name falls back to [`NO_LAST_NAME`], the title to
    /// [`NO_TITLE`]; journal and year are left out when absent.
    pub fn display_name(&self) -> String {
        let last = non_empty(&self.author_last).unwrap_or(NO_LAST_NAME);
        let initials = self
            .author_first
            .as_deref()
            .map(initials)
            .unwrap_or_default();

        let mut name = String::from(last);
        if !initials.is_empty() {
            name.push(' ');
            name.push_str(&initials);
        }

        name.push_str(" - ");
        match non_empty(&self.title) {
            Some(title) => name.extend(title.chars().take(TITLE_MAX_CHARS)),
            None => name.push_str(NO_TITLE),
        }

        if let Some(journal) = non_empty(&self.journal) {
            name.push_str(" - ");
            name.push_str(journal);
        }
        if let Some(year) = non_empty(&self.year) {
            name.push_str(" - ");
            name.push_str(year);
        }
        name
    }
}

/// First letter of each space-separated given name.
fn initials(first: &str) -> String {
    first
        .split(' ')
        .filter_map(|part| part.chars().next())
        .collect()
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
