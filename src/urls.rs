use url::Url;

use crate::record::Id;

/// Convenience wrapper for URL generation functions.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Path all API routes live under, without surrounding slashes.
    pub(crate) api_path: String,

    /// Absolute URL of the API root, without a trailing slash.
    api_root: String,
}

impl Urls {
    /// Create a new instance. `base` must be an absolute URL; `api_path` may
    /// be given with or without surrounding slashes.
    pub fn new(base: impl AsRef<str>, api_path: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let api_path = api_path.as_ref().trim_matches('/').to_owned();

        let mut base = Url::parse(base.as_ref())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let api_root = base.join(&api_path)?;

        Ok(Urls {
            api_path,
            api_root: api_root.as_str().trim_end_matches('/').to_owned(),
        })
    }

    pub fn place(&self, id: Id) -> String {
        format!("{}/places/{}", self.api_root, id)
    }

    pub fn review(&self, id: Id) -> String {
        format!("{}/reviews/{}", self.api_root, id)
    }

    pub fn user(&self, id: Id) -> String {
        format!("{}/users/{}", self.api_root, id)
    }

    pub fn pet(&self, owner_id: Id, id: Id) -> String {
        format!("{}/users/{}/pets/{}", self.api_root, owner_id, id)
    }
}
