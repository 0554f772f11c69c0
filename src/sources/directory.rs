use std::collections::HashMap;

use tracing::warn;

use crate::client::ApiClient;
use crate::parser::{OrganismEntry, parse};
use crate::sources::memo::Memo;

/// Organism code to species name, from the `/list/organism` catalogue.
pub struct SpeciesDirectory {
    client: ApiClient,
    base_url: String,
    names: Memo<HashMap<String, String>>,
}

impl SpeciesDirectory {
    pub fn new(client: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            names: Memo::default(),
        }
    }

    /// Species name for an organism code, or the code itself when the
    /// catalogue is unavailable or does not list it. A failed catalogue fetch
    /// is remembered as an empty catalogue for the lifetime of the directory.
    pub async fn species_name(&self, code: &str) -> String {
        let names = self
            .names
            .get_or_try_init("organisms", || async { Ok(self.load().await) })
            .await;
        names
            .ok()
            .and_then(|names| names.get(code).cloned())
            .unwrap_or_else(|| code.to_string())
    }

    async fn load(&self) -> HashMap<String, String> {
        let entries = match self.client.fetch(&self.base_url, "/list/organism", &[]).await {
            Ok(body) => parse::<OrganismEntry>(&body),
            Err(err) => Err(err),
        };
        match entries {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| (entry.code, strip_common_name(&entry.species)))
                .collect(),
            Err(err) => {
                warn!(error = %err, "organism catalogue unavailable, using organism codes");
                HashMap::new()
            }
        }
    }
}

/// `Homo sapiens (human)` -> `Homo sapiens`
fn strip_common_name(species: &str) -> String {
    match species.find(" (") {
        Some(index) if species.ends_with(')') => species[..index].to_string(),
        _ => species.to_string(),
    }
}
