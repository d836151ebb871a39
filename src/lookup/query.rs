//! Query extraction.
//!
//! Both front-ends reduce their native request encoding to an ordered list of
//! key/value pairs; this module turns that list into a [`QueryIntent`].

/// Query key for the NORAD catalog number.
pub const SATELLITE_ID_KEY: &str = "satellite_id";
/// Query key for a satellite name search.
pub const NAME_KEY: &str = "name";
/// Query key for a satellite group.
pub const GROUP_KEY: &str = "group";

/// What the caller asked for. Every field is independent here; precedence is
/// applied only when the upstream query is built (see [`QueryIntent::selector`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryIntent {
    pub satellite_id: Option<String>,
    pub name: Option<String>,
    pub group: Option<String>,
}

/// The one upstream parameter a lookup sends besides the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    CatalogNumber(&'a str),
    Name(&'a str),
    Group(&'a str),
}

impl<'a> Selector<'a> {
    /// Upstream query parameter name.
    pub fn param(&self) -> &'static str {
        match self {
            Selector::CatalogNumber(_) => "CATNR",
            Selector::Name(_) => "NAME",
            Selector::Group(_) => "GROUP",
        }
    }

    pub fn value(&self) -> &'a str {
        match self {
            Selector::CatalogNumber(v) | Selector::Name(v) | Selector::Group(v) => v,
        }
    }
}

impl QueryIntent {
    /// Build an intent from decoded key/value pairs. Unknown keys are ignored
    /// and a repeated key overwrites the earlier value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut intent = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                SATELLITE_ID_KEY => &mut intent.satellite_id,
                NAME_KEY => &mut intent.name,
                GROUP_KEY => &mut intent.group,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        intent
    }

    /// Build an intent from raw `key=value` tokens. Tokens without a `=` are
    /// skipped; only the first `=` separates key from value.
    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = tokens
            .into_iter()
            .filter_map(|token| {
                token
                    .as_ref()
                    .split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
        Self::from_pairs(pairs)
    }

    /// True when no field carries a non-empty value.
    pub fn is_empty(&self) -> bool {
        self.selector().is_none()
    }

    /// The single field honored upstream: satellite_id, then name, then group.
    pub fn selector(&self) -> Option<Selector<'_>> {
        if let Some(id) = non_empty(&self.satellite_id) {
            Some(Selector::CatalogNumber(id))
        } else if let Some(name) = non_empty(&self.name) {
            Some(Selector::Name(name))
        } else {
            non_empty(&self.group).map(Selector::Group)
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}
