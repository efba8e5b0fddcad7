/// Extension-based categorization of files.
///
/// A [`CategoryTable`] is an ordered list of named categories, each owning a
/// set of lowercase extensions (leading dot included). The table is built once
/// and never mutated afterwards.
///
/// # Examples
///
/// ```
/// use shelve::file_category::CategoryTable;
///
/// let table = CategoryTable::standard();
/// assert_eq!(table.classify("photo.JPG"), Some("images"));
/// assert_eq!(table.classify("backup.tar.gz"), Some("archives"));
/// assert_eq!(table.classify("README"), None);
/// ```
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// The compiled-in category table, in lookup order.
pub const STANDARD_CATEGORIES: &[(&str, &[&str])] = &[
    ("images", &[".jpg", ".jpeg", ".png", ".gif", ".webp"]),
    ("docs", &[".pdf", ".docx", ".txt", ".md", ".xcl"]),
    ("audio", &[".mp3", ".wav", ".flac"]),
    ("videos", &[".mp4", ".mov", ".avi"]),
    ("archives", &[".zip", ".tar", ".gz", ".rar"]),
    ("code", &[".py", ".js", ".html", ".css"]),
    ("executables", &[".exe"]),
];

/// Errors raised while validating a category table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    /// The same extension is claimed by two different categories.
    #[error("extension '{extension}' is listed under both '{first}' and '{second}'")]
    DuplicateExtension {
        extension: String,
        first: String,
        second: String,
    },
    /// A category name cannot be used as a folder name.
    #[error("invalid category name '{0}'")]
    InvalidName(String),
}

/// A named bucket of extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    extensions: Vec<String>,
}

impl Category {
    /// Returns the category name, which is also its folder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the extensions of this category in definition order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Maps file extensions to category names.
///
/// Lookups go through an index built at construction time. When an extension
/// appears in several categories, the first category in definition order
/// wins; [`CategoryTable::from_entries`] rejects such tables outright.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    categories: Vec<Category>,
    index: HashMap<String, usize>,
}

impl CategoryTable {
    /// Returns the compiled-in table.
    pub fn standard() -> Self {
        let mut table = Self {
            categories: Vec::with_capacity(STANDARD_CATEGORIES.len()),
            index: HashMap::new(),
        };
        for (name, extensions) in STANDARD_CATEGORIES {
            table.push(name, extensions.iter().map(|ext| normalize_extension(ext)));
        }
        table
    }

    /// Builds a table from `(name, extensions)` pairs, validating it.
    ///
    /// Extensions are lowercased and given a leading dot if they lack one.
    /// An extension repeated inside one category is collapsed with a warning;
    /// an extension shared by two categories is an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use shelve::file_category::{CategoryError, CategoryTable};
    ///
    /// let table = CategoryTable::from_entries([("text", vec!["TXT", ".md"])]).unwrap();
    /// assert_eq!(table.classify("notes.txt"), Some("text"));
    ///
    /// let clash = CategoryTable::from_entries([
    ///     ("text", vec![".txt"]),
    ///     ("docs", vec![".txt"]),
    /// ]);
    /// assert!(matches!(clash, Err(CategoryError::DuplicateExtension { .. })));
    /// ```
    pub fn from_entries<I, N, E, S>(entries: I) -> Result<Self, CategoryError>
    where
        I: IntoIterator<Item = (N, E)>,
        N: AsRef<str>,
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self {
            categories: Vec::new(),
            index: HashMap::new(),
        };

        for (name, extensions) in entries {
            let name = name.as_ref();
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(CategoryError::InvalidName(name.to_string()));
            }

            let mut seen: Vec<String> = Vec::new();
            for ext in extensions {
                let ext = normalize_extension(ext.as_ref());
                if seen.contains(&ext) {
                    tracing::warn!(category = name, extension = %ext, "duplicate extension collapsed");
                    continue;
                }
                if let Some(&owner) = table.index.get(&ext) {
                    return Err(CategoryError::DuplicateExtension {
                        extension: ext,
                        first: table.categories[owner].name.clone(),
                        second: name.to_string(),
                    });
                }
                seen.push(ext);
            }
            table.push(name, seen);
        }

        Ok(table)
    }

    fn push(&mut self, name: &str, extensions: impl IntoIterator<Item = String>) {
        let position = self.categories.len();
        let extensions: Vec<String> = extensions.into_iter().collect();
        for ext in &extensions {
            self.index.entry(ext.clone()).or_insert(position);
        }
        self.categories.push(Category {
            name: name.to_string(),
            extensions,
        });
    }

    /// Returns the category for a file name, or `None` to leave it in place.
    ///
    /// The extension is whatever follows the final `.` of the file name,
    /// compared case-insensitively. Compound extensions get no special
    /// treatment: `backup.tar.gz` is looked up as `.gz`.
    pub fn classify(&self, file_name: impl AsRef<Path>) -> Option<&str> {
        let ext = extension_of(file_name.as_ref())?;
        self.index
            .get(&ext)
            .map(|&position| self.categories[position].name.as_str())
    }

    /// Iterates category names in definition order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    /// Looks up a category by name.
    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// True when the table has no categories.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Extracts the lowercase, dot-prefixed extension of a file name.
///
/// A name made only of a leading dot and a stem (`.bashrc`) has no extension.
fn extension_of(file_name: &Path) -> Option<String> {
    let ext = file_name.extension()?.to_str()?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

fn normalize_extension(ext: &str) -> String {
    let lower = ext.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}
