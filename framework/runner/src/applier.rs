use std::collections::BTreeMap;
use std::path::Path;

use futures::future::try_join_all;
use truapi_client::prelude::{
    GeographyEntry, LoadTestClient, ResourceId, ScriptTestLinkPayload, SCRIPT_NAME,
};
use truapi_core::prelude::{LaunchError, LaunchResult};

use crate::config::{Policy, RemoteConfig};
use crate::context::ScriptBinding;

/// Pushes the local configuration onto resources that have already been provisioned.
pub struct ConfigurationApplier<'a> {
    client: &'a LoadTestClient,
}

impl<'a> ConfigurationApplier<'a> {
    pub fn new(client: &'a LoadTestClient) -> Self {
        Self { client }
    }

    /// Apply the policy and the distribution concurrently.
    ///
    /// The two act on different sub-resources of the test. The first failure to arrive is
    /// returned and whatever the other side had already applied stays applied.
    pub async fn apply(
        &self,
        test_id: &ResourceId,
        script: &ScriptBinding,
        config: &RemoteConfig,
    ) -> LaunchResult<Vec<GeographyEntry>> {
        log::info!("starting test configuration...");

        let ((), geography) = tokio::try_join!(
            self.apply_policy(test_id, script, &config.policy),
            self.apply_geography(test_id, &config.distribution, &config.source),
        )?;

        Ok(geography)
    }

    /// Overwrite the link's duration, pacing, ramp-up, tear-down and virtual user count.
    pub async fn apply_policy(
        &self,
        test_id: &ResourceId,
        script: &ScriptBinding,
        policy: &Policy,
    ) -> LaunchResult<()> {
        log::info!("configuring script details...");

        let payload = ScriptTestLinkPayload::new(
            Some(script.link_id.clone()),
            test_id.clone(),
            script.script_id.clone(),
            SCRIPT_NAME,
            &policy.link_policy(),
        );
        self.client.configure_script_link(&payload).await?;

        log::info!(
            "applied policy to link {}: duration {}s, pacing {}, ramp-up {}s, tear-down {}s",
            script.link_id,
            policy.duration,
            policy.pacing,
            policy.ramp_up,
            policy.tear_down
        );

        Ok(())
    }

    /// Replace the test's distribution with the configured one.
    ///
    /// Returns the entries that were pushed. Each is pushed with its own call and the calls run
    /// concurrently, so a failure can leave the distribution partly applied.
    pub async fn apply_geography(
        &self,
        test_id: &ResourceId,
        distribution: &BTreeMap<String, f64>,
        source: &Path,
    ) -> LaunchResult<Vec<GeographyEntry>> {
        log::info!("configuring geographies...");

        let current = self.client.get_distribution(test_id).await?;
        let updates = distribution_updates(&current, distribution, source)?;

        try_join_all(
            updates
                .iter()
                .map(|entry| self.client.set_geography(test_id, entry)),
        )
        .await?;

        log::info!(
            "applied distribution to test {test_id}: {}",
            updates
                .iter()
                .map(|entry| format!("{}={}", entry.name, entry.vusers_percent))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(updates)
    }
}

/// The entries to push so that the remote distribution matches `desired`.
///
/// Every entry that currently has weight is zeroed, then every configured region gets its
/// configured weight. Entries that are zero and not configured are left out. A configured region
/// the test does not offer is a configuration error.
pub fn distribution_updates(
    current: &[GeographyEntry],
    desired: &BTreeMap<String, f64>,
    source: &Path,
) -> LaunchResult<Vec<GeographyEntry>> {
    let mut updates = current
        .iter()
        .filter(|entry| entry.vusers_percent != 0.0)
        .cloned()
        .map(|mut entry| {
            entry.vusers_percent = 0.0;
            entry
        })
        .collect::<Vec<_>>();

    for (region, weight) in desired {
        let available = current
            .iter()
            .find(|entry| &entry.name == region)
            .ok_or_else(|| {
                LaunchError::config(
                    source,
                    format!(
                        "region `{region}` is not available for this test, expected one of: {}",
                        current
                            .iter()
                            .map(|entry| entry.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
            })?;

        match updates.iter_mut().find(|entry| entry.id == available.id) {
            Some(zeroed) => zeroed.vusers_percent = *weight,
            None => {
                let mut entry = available.clone();
                entry.vusers_percent = *weight;
                updates.push(entry);
            }
        }
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};

    fn entry(id: i64, name: &str, percent: f64) -> GeographyEntry {
        GeographyEntry {
            id: ResourceId::Number(id),
            name: name.to_string(),
            vusers_percent: percent,
            extra: Map::new(),
        }
    }

    fn weights(updates: &[GeographyEntry]) -> Vec<(String, f64)> {
        updates
            .iter()
            .map(|entry| (entry.name.clone(), entry.vusers_percent))
            .collect()
    }

    #[test]
    fn zeroes_previous_weights_then_sets_configured_ones() {
        let current = vec![
            entry(1, "A", 30.0),
            entry(2, "B", 70.0),
            entry(3, "C", 0.0),
            entry(4, "D", 0.0),
        ];
        let desired = BTreeMap::from([("B".to_string(), 50.0), ("C".to_string(), 50.0)]);

        let updates = distribution_updates(&current, &desired, Path::new("truapi.json")).unwrap();

        assert_eq!(
            weights(&updates),
            vec![
                ("A".to_string(), 0.0),
                ("B".to_string(), 50.0),
                ("C".to_string(), 50.0),
            ]
        );
    }

    #[test]
    fn untouched_entries_are_not_pushed() {
        let current = vec![entry(1, "US", 0.0), entry(2, "EU", 0.0)];
        let desired = BTreeMap::from([("US".to_string(), 100.0)]);

        let updates = distribution_updates(&current, &desired, Path::new("truapi.json")).unwrap();

        assert_eq!(weights(&updates), vec![("US".to_string(), 100.0)]);
    }

    #[test]
    fn unknown_fields_survive_the_update() {
        let mut us = entry(1, "US", 0.0);
        us.extra.insert("region_code".to_string(), json!("us-east-1"));
        let desired = BTreeMap::from([("US".to_string(), 100.0)]);

        let updates = distribution_updates(&[us], &desired, Path::new("truapi.json")).unwrap();

        assert_eq!(updates[0].extra.get("region_code"), Some(&json!("us-east-1")));
    }

    #[test]
    fn unknown_region_is_a_config_error() {
        let current = vec![entry(1, "US", 100.0)];
        let desired = BTreeMap::from([("Mars".to_string(), 100.0)]);

        let err = distribution_updates(&current, &desired, Path::new("truapi.json")).unwrap_err();

        assert!(matches!(err, LaunchError::Config { .. }));
        assert!(err.to_string().contains("Mars"));
    }
}
