//! Declared routes.
//!
//! A [`RouteSet`] is the operator-supplied list of intents and their example
//! utterances. It is loaded once at startup, either from a route file or from
//! the built-in list, and never changes for the lifetime of the process.

use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::warn;

use crate::error::{RouterError, RouterResult};
use crate::record::RecordKey;

/// A named intent with example utterances used as embedding anchors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub utterances: Vec<String>,
}

impl Route {
    pub fn new<I, S>(name: impl Into<String>, utterances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            utterances: utterances.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    routes: Vec<Route>,
}

/// Validated, ordered set of routes with unique names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSet {
    routes: Vec<Route>,
}

impl RouteSet {
    /// Validate and build a route set.
    ///
    /// Duplicate utterances within one route are collapsed (first occurrence
    /// kept) so every key maps to exactly one index record.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] for empty or duplicate names,
    /// names containing a backtick, routes without utterances, or blank
    /// utterances.
    pub fn new(routes: Vec<Route>) -> RouterResult<Self> {
        let mut names = HashSet::new();
        let mut validated = Vec::with_capacity(routes.len());

        for route in routes {
            let name = route.name.trim();
            if name.is_empty() {
                return Err(RouterError::configuration("route name must not be empty"));
            }
            if name.contains('`') {
                return Err(RouterError::configuration(format!(
                    "route name '{name}' must not contain a backtick"
                )));
            }
            if !names.insert(name.to_string()) {
                return Err(RouterError::configuration(format!(
                    "duplicate route name '{name}'"
                )));
            }
            if route.utterances.is_empty() {
                return Err(RouterError::configuration(format!(
                    "route '{name}' has no utterances"
                )));
            }

            let mut seen = HashSet::new();
            let mut utterances = Vec::with_capacity(route.utterances.len());
            for utterance in route.utterances {
                if utterance.trim().is_empty() {
                    return Err(RouterError::configuration(format!(
                        "route '{name}' has a blank utterance"
                    )));
                }
                if seen.insert(utterance.clone()) {
                    utterances.push(utterance);
                } else {
                    warn!(route = name, utterance = %utterance, "Dropping duplicate utterance");
                }
            }

            validated.push(Route {
                name: name.to_string(),
                utterances,
            });
        }

        Ok(Self { routes: validated })
    }

    /// Load a route set from a YAML, TOML or JSON file with a top-level
    /// `routes` list.
    pub fn from_file(path: impl AsRef<Path>) -> RouterResult<Self> {
        let file: RouteFile = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        Self::new(file.routes)
    }

    /// Default intents shipped with the service.
    pub fn builtin() -> Self {
        let routes = vec![
            Route::new(
                "politics",
                [
                    "isn't politics the best thing ever",
                    "why don't you tell me about your political opinions",
                    "don't you just love the president",
                    "they're going to destroy this country!",
                    "they will save the country!",
                ],
            ),
            Route::new(
                "chitchat",
                [
                    "how's the weather today?",
                    "how are things going?",
                    "lovely weather today",
                    "the weather is horrendous",
                    "let's go to the chippy",
                ],
            ),
            Route::new(
                "technical_support",
                [
                    "my application is crashing",
                    "I'm getting an error message",
                    "how do I reset my password",
                    "the system is running slow",
                    "I can't connect to the service",
                    "help me troubleshoot this issue",
                ],
            ),
            Route::new(
                "billing",
                [
                    "I have a question about my invoice",
                    "how do I update my payment method",
                    "can I get a refund",
                    "what are your pricing plans",
                    "I was charged incorrectly",
                    "when is my next payment due",
                ],
            ),
            Route::new(
                "product_info",
                [
                    "what features does your product have",
                    "tell me about your enterprise plan",
                    "do you have an API",
                    "what integrations do you support",
                    "is there a free tier available",
                    "how does your product compare to competitors",
                ],
            ),
        ];
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains_route(&self, name: &str) -> bool {
        self.routes.iter().any(|r| r.name == name)
    }

    /// Every declared `(route, utterance)` key, in declaration order.
    pub fn keys(&self) -> Vec<RecordKey> {
        self.routes
            .iter()
            .flat_map(|route| {
                route
                    .utterances
                    .iter()
                    .map(move |u| RecordKey::new(route.name.clone(), u.clone()))
            })
            .collect()
    }

    /// Total number of declared utterances.
    pub fn utterance_count(&self) -> usize {
        self.routes.iter().map(|r| r.utterances.len()).sum()
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }
}
