//! URL slugs for store names.
//!
//! A name is slugified to a base, then existing slugs of the form `base` or
//! `base-N` are counted. No matches keeps the base; `n` matches yields
//! `base-(n+1)`. The count is not a search for the lowest free suffix, so
//! deleting stores can make a later suffix collide; the `stores.slug` unique
//! constraint and the retry in `services` catch that.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SlugError {
    #[error("name has no characters usable in a slug")]
    MalformedName,
    #[error("slug index failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// Lookup of slugs already in use.
#[async_trait]
pub trait SlugIndex: Send + Sync {
    /// Slugs matching `pattern` case-insensitively, skipping the record `exclude`.
    async fn find_slugs_matching(
        &self,
        pattern: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Vec<String>>;
}

fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
        'œ' => "oe",
        'ß' => "ss",
        'ś' | 'š' => "s",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ł' => "l",
        '&' => "and",
        _ => return None,
    };
    Some(folded)
}

/// Lowercase, ASCII-only, hyphen separated. Apostrophes vanish rather than
/// splitting words, so "Bob's Cafe" becomes `bobs-cafe`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}') {
            continue;
        }
        let mut buf = [0u8; 4];
        let piece: Option<&str> = if c.is_ascii_alphanumeric() {
            Some(c.encode_utf8(&mut buf))
        } else {
            fold_char(c)
        };
        match piece {
            Some(p) => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push_str(p);
            }
            None => pending_dash = true,
        }
    }
    out
}

/// Matches `base` itself or `base` with a numeric suffix. `base` only holds
/// `[a-z0-9-]`, so it needs no escaping.
pub fn collision_pattern(base: &str) -> String {
    format!("^({base})(-[0-9]*)?$")
}

#[derive(Clone)]
pub struct SlugResolver {
    index: Arc<dyn SlugIndex>,
}

impl SlugResolver {
    pub fn new(index: Arc<dyn SlugIndex>) -> Self {
        Self { index }
    }

    /// Slug for a record whose name is being saved. `Ok(None)` means the name
    /// did not change and the current slug stays.
    pub async fn resolve(
        &self,
        name: &str,
        record: Option<Uuid>,
        name_changed: bool,
    ) -> Result<Option<String>, SlugError> {
        if !name_changed {
            return Ok(None);
        }
        self.resolve_attempt(name, record, 0).await.map(Some)
    }

    /// Like `resolve`, with the suffix pushed `attempt` places further. Used to
    /// retry after the store rejected a slug as taken.
    pub async fn resolve_attempt(
        &self,
        name: &str,
        record: Option<Uuid>,
        attempt: usize,
    ) -> Result<String, SlugError> {
        let base = slugify(name);
        if base.is_empty() {
            return Err(SlugError::MalformedName);
        }

        let matches = self
            .index
            .find_slugs_matching(&collision_pattern(&base), record)
            .await
            .map_err(SlugError::Persistence)?
            .len();

        let slug = if matches == 0 && attempt == 0 {
            base
        } else {
            format!("{}-{}", base, matches + 1 + attempt)
        };
        debug!(%slug, matches, attempt, "slug resolved");
        Ok(slug)
    }
}
