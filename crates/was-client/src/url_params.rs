//! [`ParamStore`] backed by a URL query string.
//!
//! Mirrors what a browser keeps in its location bar: writing `user=alice`
//! rewrites the query in place, so [`UrlParams::url`] is a link that resumes
//! the same session.

use std::cell::RefCell;

use url::Url;
use was_core::identity::ParamStore;

use crate::ClientError;

#[derive(Debug)]
pub struct UrlParams {
    url: RefCell<Url>,
}

impl UrlParams {
    pub fn new(url: Url) -> Self {
        Self {
            url: RefCell::new(url),
        }
    }

    pub fn parse(url: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self::new(parsed))
    }

    /// The current URL, query included.
    pub fn url(&self) -> Url {
        self.url.borrow().clone()
    }
}

impl ParamStore for UrlParams {
    fn get(&self, key: &str) -> Option<String> {
        self.url
            .borrow()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Replace `key` in place, or append it if it is new.
    fn set(&self, key: &str, value: &str) {
        let mut url = self.url.borrow_mut();
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.to_string(),
            None => pairs.push((key.to_string(), value.to_string())),
        }
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}
