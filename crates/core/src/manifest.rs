//! The fixed asset list a generation must hold before it counts as installed.

use url::Url;

use crate::config::AppConfig;
use crate::request::RequestIdentity;
use crate::Error;

/// Ordered, de-duplicated set of GET identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<RequestIdentity>,
}

impl Manifest {
    /// Resolve manifest paths against an origin.
    ///
    /// Absolute URLs are accepted as-is; `/`-rooted paths are joined onto
    /// `origin`. Duplicates after canonicalization are dropped, first one wins.
    pub fn resolve<S: AsRef<str>>(origin: Option<&Url>, paths: &[S]) -> Result<Self, Error> {
        let mut entries: Vec<RequestIdentity> = Vec::with_capacity(paths.len());
        for path in paths {
            let identity = RequestIdentity::resolve("GET", path.as_ref(), origin)?;
            if !entries.contains(&identity) {
                entries.push(identity);
            }
        }
        Ok(Self { entries })
    }

    /// Build the manifest described by the application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config
            .origin_url()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        Self::resolve(origin.as_ref(), &config.manifest)
    }

    pub fn from_identities(identities: impl IntoIterator<Item = RequestIdentity>) -> Self {
        let mut entries = Vec::new();
        for identity in identities {
            if !entries.contains(&identity) {
                entries.push(identity);
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[RequestIdentity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_against_origin() {
        let origin = Url::parse("https://shop.test").unwrap();
        let manifest = Manifest::resolve(Some(&origin), &["/", "/index.html", "/css/app.css"]).unwrap();
        let urls: Vec<&str> = manifest.entries().iter().map(|e| e.url().as_str()).collect();
        assert_eq!(urls, vec!["https://shop.test/", "https://shop.test/index.html", "https://shop.test/css/app.css"]);
        assert!(manifest.entries().iter().all(RequestIdentity::is_get));
    }

    #[test]
    fn test_resolve_dedupes() {
        let origin = Url::parse("https://shop.test").unwrap();
        let manifest = Manifest::resolve(Some(&origin), &["/a.js", "/a.js#x", "https://SHOP.test/a.js"]).unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_resolve_relative_without_origin_fails() {
        let result = Manifest::resolve(None, &["/index.html"]);
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_from_config() {
        let config = AppConfig {
            origin: Some("http://localhost:3000".into()),
            manifest: vec!["/".into(), "/logo.png".into()],
            ..Default::default()
        };
        let manifest = Manifest::from_config(&config).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(Manifest::from_config(&AppConfig::default()).unwrap().is_empty());
    }
}
