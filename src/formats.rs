use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ParseError;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    #[serde(default = "default_state_version")]
    pub version: u32,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub discovered_api: Option<ApiDescriptor>,
    #[serde(default)]
    pub max_offset: Option<u64>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub book_list_complete: bool,
    #[serde(default)]
    pub details_fetched: BTreeSet<String>,
    #[serde(default)]
    pub images_downloaded: BTreeSet<String>,
}

fn default_state_version() -> u32 {
    STATE_VERSION
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            session: None,
            discovered_api: None,
            max_offset: None,
            books: Vec::new(),
            book_list_complete: false,
            details_fetched: BTreeSet::new(),
            images_downloaded: BTreeSet::new(),
        }
    }
}

impl PipelineState {
    /// Appends books whose id is not already present, returning how many were added.
    pub fn append_new_books(&mut self, books: impl IntoIterator<Item = Book>) -> usize {
        let mut seen = self.books.iter().map(|b| b.id.clone()).collect::<HashSet<_>>();
        let before = self.books.len();
        for book in books {
            if seen.insert(book.id.clone()) {
                self.books.push(book);
            }
        }
        self.books.len() - before
    }

    pub fn pending_details(&self) -> Vec<String> {
        self.books
            .iter()
            .filter(|b| !self.details_fetched.contains(&b.id))
            .map(|b| b.id.clone())
            .collect()
    }

    pub fn pending_images(&self) -> Vec<String> {
        self.books
            .iter()
            .filter(|b| !self.images_downloaded.contains(&b.id))
            .map(|b| b.id.clone())
            .collect()
    }

    pub fn book_mut(&mut self, id: &str) -> Option<&mut Book> {
        self.books.iter_mut().find(|b| b.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub api_base: String,
    pub store_id: String,
    pub category: String,
    pub discovered_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,
    pub cover_image_cache: String,
    #[serde(default)]
    pub interior_images: Vec<InteriorImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteriorImage {
    pub key: String,
    pub cache: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b2b: Option<String>,
}

/// One entry of the dataset consumed by the web server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedBook {
    pub id: String,
    pub title: String,
    pub cover_image: String,
    pub interior_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_height: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseResponse {
    /// Kept untyped so one odd row cannot reject the whole page.
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
    #[serde(default)]
    pub max_offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBrowseRow {
    #[serde(default, deserialize_with = "de_opt_token")]
    pub eisbn: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub binding: Option<String>,
    #[serde(default, deserialize_with = "de_opt_token")]
    pub price: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub pubdate: Option<String>,
    #[serde(default, deserialize_with = "de_opt_token")]
    pub cover_image_cache: Option<String>,
}

impl RawBrowseRow {
    /// Parses one untyped browse row into a validated `Book`.
    pub fn parse(value: serde_json::Value) -> Result<Book, ParseError> {
        serde_json::from_value::<Self>(value)
            .map_err(|source| ParseError::InvalidRow { source })?
            .into_book()
    }

    pub fn into_book(self) -> Result<Book, ParseError> {
        let id = non_blank(self.eisbn).ok_or(ParseError::MissingField { field: "eisbn" })?;
        // The id names the book's image directory.
        if !is_plain_id(&id) {
            return Err(ParseError::InvalidId { id });
        }
        let title =
            non_blank(self.title).ok_or_else(|| ParseError::MissingTitle { id: id.clone() })?;
        Ok(Book {
            id,
            title,
            author: non_blank(self.author),
            binding: non_blank(self.binding),
            price: non_blank(self.price),
            publisher: non_blank(self.publisher),
            pubdate: non_blank(self.pubdate),
            cover_image_cache: self.cover_image_cache.unwrap_or_default(),
            interior_images: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemDetailResponse {
    #[serde(default)]
    pub interior_objects: Vec<RawInteriorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInteriorObject {
    #[serde(deserialize_with = "de_token")]
    pub key: String,
    #[serde(default, deserialize_with = "de_opt_token")]
    pub cb: Option<String>,
    #[serde(default, deserialize_with = "de_opt_token")]
    pub b2b: Option<String>,
}

impl ItemDetailResponse {
    /// Missing per-image cache tokens fall back to the book's cover token.
    pub fn interior_images(self, cover_cache: &str) -> Vec<InteriorImage> {
        self.interior_objects
            .into_iter()
            .map(|obj| InteriorImage {
                key: obj.key,
                cache: non_blank(obj.cb).unwrap_or_else(|| cover_cache.to_owned()),
                b2b: non_blank(obj.b2b),
            })
            .collect()
    }
}

fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Token {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        match token {
            Token::Text(text) => text,
            Token::Int(n) => n.to_string(),
            Token::Float(n) => n.to_string(),
        }
    }
}

fn de_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Token::deserialize(deserializer).map(String::from)
}

fn de_opt_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Token>::deserialize(deserializer)?.map(String::from))
}
