//! Photo reference resolution
//!
//! Stored photo references come in several shapes: absolute URLs, inline
//! `data:` payloads, storage paths, bare file names and the occasional opaque
//! blob that was never a usable reference. [`PhotoResolver::resolve`] turns
//! one of them into a [`FallbackChain`]: the ordered list of URLs a renderer
//! tries one after another, always ending in a placeholder image. The
//! renderer walks the chain with a [`PhotoCursor`]; no retry state lives in
//! the resolver.
use super::config::PhotoConfig;
use tracing::debug;

/// Opaque stored pointer to a tire photo. Not checked when written.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhotoReference(#[n(0)] String);

impl PhotoReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PhotoReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoClass {
    /// `scheme://...`, used as is
    Absolute,
    /// `data:` payload, used as is and never reconstructed
    Inline,
    /// Long base64-only text or a flagged marker; never fetched
    Suspect,
    /// Storage path or bare file name
    Stored,
    /// Empty reference
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    class: PhotoClass,
    sources: Vec<String>,
    placeholder: String,
}

impl FallbackChain {
    pub fn class(&self) -> PhotoClass {
        self.class
    }

    /// Candidates derived from the stored reference, without the placeholder.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// The full ordered chain. Never empty; the last entry is the placeholder.
    pub fn urls(&self) -> Vec<&str> {
        self.sources
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.placeholder.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        match position.cmp(&self.sources.len()) {
            std::cmp::Ordering::Less => Some(self.sources[position].as_str()),
            std::cmp::Ordering::Equal => Some(self.placeholder.as_str()),
            std::cmp::Ordering::Greater => None,
        }
    }

    pub fn cursor(&self) -> PhotoCursor<'_> {
        PhotoCursor {
            chain: self,
            position: 0,
        }
    }
}

/// What the renderer should show next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoOutcome<'a> {
    Load(&'a str),
    /// Every candidate, placeholder included, failed to load
    ResolutionExhausted,
}

/// Renderer-side position in a [`FallbackChain`].
#[derive(Debug, Clone)]
pub struct PhotoCursor<'a> {
    chain: &'a FallbackChain,
    position: usize,
}

impl<'a> PhotoCursor<'a> {
    pub fn current(&self) -> PhotoOutcome<'a> {
        match self.chain.get(self.position) {
            Some(url) => PhotoOutcome::Load(url),
            None => PhotoOutcome::ResolutionExhausted,
        }
    }

    /// Call when the current candidate failed to load.
    pub fn fail(&mut self) -> PhotoOutcome<'a> {
        if self.position < self.chain.len() {
            self.position += 1;
        }
        self.current()
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.chain.len()
    }
}

#[derive(Debug, Clone)]
pub struct PhotoResolver {
    canonical_base: String,
    alternate_base: String,
    placeholders: Vec<String>,
    blob_markers: Vec<String>,
    suspect_min_len: usize,
    max_reference_len: usize,
}

impl Default for PhotoResolver {
    fn default() -> Self {
        Self::new(&PhotoConfig::default())
    }
}

impl PhotoResolver {
    pub fn new(config: &PhotoConfig) -> Self {
        let placeholders = if config.placeholders.is_empty() {
            PhotoConfig::default().placeholders
        } else {
            config.placeholders.clone()
        };

        Self {
            canonical_base: config.canonical_base.trim_end_matches('/').to_string(),
            alternate_base: config.alternate_base.trim_end_matches('/').to_string(),
            placeholders,
            blob_markers: config
                .blob_markers
                .iter()
                .map(|marker| marker.to_ascii_lowercase())
                .collect(),
            suspect_min_len: config.suspect_min_len,
            max_reference_len: config.max_reference_len,
        }
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Placeholder for the photo at `index`, cycling through the fixed set.
    pub fn placeholder(&self, index: usize) -> &str {
        &self.placeholders[index % self.placeholders.len()]
    }

    pub fn classify(&self, raw: &str) -> PhotoClass {
        let raw = raw.trim();

        if raw.is_empty() {
            PhotoClass::Missing
        } else if has_network_scheme(raw) {
            PhotoClass::Absolute
        } else if starts_with_ignore_case(raw, "data:") {
            PhotoClass::Inline
        } else if self.is_suspect(raw) {
            PhotoClass::Suspect
        } else {
            PhotoClass::Stored
        }
    }

    fn is_suspect(&self, raw: &str) -> bool {
        if self
            .blob_markers
            .iter()
            .any(|marker| starts_with_ignore_case(raw, marker))
        {
            return true;
        }
        if raw.len() > self.max_reference_len {
            return true;
        }
        raw.len() >= self.suspect_min_len && raw.bytes().all(is_base64_byte)
    }

    pub fn resolve(&self, raw: &str, index: usize) -> FallbackChain {
        let class = self.classify(raw);
        let raw = raw.trim();

        let sources = match class {
            PhotoClass::Absolute | PhotoClass::Inline => vec![raw.to_string()],
            PhotoClass::Suspect | PhotoClass::Missing => vec![],
            PhotoClass::Stored => self.stored_candidates(raw),
        };
        debug!(?class, index, candidates = sources.len(), "resolved photo reference");

        FallbackChain {
            class,
            sources,
            placeholder: self.placeholder(index).to_string(),
        }
    }

    pub fn resolve_all(&self, references: &[PhotoReference]) -> Vec<FallbackChain> {
        references
            .iter()
            .enumerate()
            .map(|(index, reference)| self.resolve(reference.as_str(), index))
            .collect()
    }

    fn stored_candidates(&self, raw: &str) -> Vec<String> {
        let path = normalize_path(raw);
        let filename = file_name(path);

        let mut candidates = Vec::with_capacity(2);
        if !path.is_empty() {
            candidates.push(format!("{}/{}", self.canonical_base, path));
        }
        if !filename.is_empty() {
            let alternate = format!("{}/{}", self.alternate_base, filename);
            if !candidates.contains(&alternate) {
                candidates.push(alternate);
            }
        }
        candidates
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// `scheme://rest` with an RFC 3986 scheme and something after the slashes.
fn has_network_scheme(raw: &str) -> bool {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
}

/// Base64 alphabet minus `/`: anything with a slash is read as a storage path.
fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'=' | b'-' | b'_')
}

/// Drops leading slashes, `./` and an `uploads/` prefix the store already adds.
fn normalize_path(raw: &str) -> &str {
    let path = raw.trim_start_matches("./").trim_start_matches('/');
    path.strip_prefix("uploads/").unwrap_or(path)
}

/// Last path segment with any query string or fragment removed.
fn file_name(path: &str) -> &str {
    let last = path.rsplit('/').next().unwrap_or(path);
    last.split(['?', '#']).next().unwrap_or(last)
}
