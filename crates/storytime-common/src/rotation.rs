use thiserror::Error;

/// The current author isn't part of the story's rotation.
///
/// Authors are fixed at creation and `next_author` is always drawn from them,
/// so this only happens when a stored story is corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not find author {author} in author list {authors:?}")]
pub struct AuthorNotFound {
    pub author: String,
    pub authors: Vec<String>,
}

/// Returns the author after `current`, wrapping to the first.
pub fn find_next_author<'a>(authors: &'a [String], current: &str) -> Result<&'a str, AuthorNotFound> {
    authors
        .iter()
        .position(|a| a == current)
        .map(|i| authors[(i + 1) % authors.len()].as_str())
        .ok_or_else(|| AuthorNotFound {
            author: current.to_string(),
            authors: authors.to_vec(),
        })
}
