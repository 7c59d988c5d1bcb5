use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// File extensions the service accepts on image routes.
///
/// Built once at configuration load. Accepts either a list
/// (`extensions = ["jpg", "png"]`) or a table of flags
/// (`[image.support.extensions] jpg = true`), normalising every entry to
/// lower case without a leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExtensionList", into = "Vec<String>")]
pub struct SupportedExtensions(BTreeSet<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtensionList {
    List(Vec<String>),
    Table(BTreeMap<String, bool>),
}

impl SupportedExtensions {
    pub fn new<I, S>(extensions: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for extension in extensions {
            let normalized = extension
                .as_ref()
                .trim()
                .trim_start_matches('.')
                .to_ascii_lowercase();
            if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!(
                    "invalid image extension '{}'",
                    extension.as_ref()
                ));
            }
            set.insert(normalized);
        }
        Ok(Self(set))
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(&extension.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SupportedExtensions {
    fn default() -> Self {
        Self(
            ["jpg", "jpeg", "webp", "png", "tiff"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        )
    }
}

impl TryFrom<ExtensionList> for SupportedExtensions {
    type Error = String;

    fn try_from(list: ExtensionList) -> Result<Self, Self::Error> {
        match list {
            ExtensionList::List(entries) => Self::new(entries),
            ExtensionList::Table(flags) => Self::new(
                flags
                    .into_iter()
                    .filter_map(|(extension, enabled)| enabled.then_some(extension)),
            ),
        }
    }
}

impl From<SupportedExtensions> for Vec<String> {
    fn from(extensions: SupportedExtensions) -> Self {
        extensions.0.into_iter().collect()
    }
}
