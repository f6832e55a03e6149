use truapi_client::prelude::{
    LinkPolicy, LoadTestClient, ResourceId, ScriptReload, ScriptTestLinkPayload, TestResource,
    SCRIPT_NAME,
};
use truapi_core::prelude::LaunchResult;

use crate::context::{ScriptBinding, ScriptOrigin};
use crate::locator::ResourceLocator;

/// Name a link is created with, before the policy step renames it.
const NEW_LINK_NAME: &str = "no name";

/// Creates resources the locator cannot find and reuses the ones it can.
///
/// Nothing is rolled back on failure. A half created resource is found and reused by the next
/// invocation.
pub struct ResourceProvisioner<'a> {
    client: &'a LoadTestClient,
    locator: ResourceLocator<'a>,
}

impl<'a> ResourceProvisioner<'a> {
    pub fn new(client: &'a LoadTestClient) -> Self {
        Self {
            client,
            locator: ResourceLocator::new(client),
        }
    }

    /// Find the test called `name`, or create it.
    ///
    /// An existing test is returned as listed, even if it differs from what would be created. A
    /// new test is created and then immediately updated with the bookkeeping fields, because the
    /// create endpoint only takes a name.
    pub async fn ensure_test(&self, name: &str) -> LaunchResult<TestResource> {
        log::info!("checking if the test `{name}` already exists...");

        if let Some(test) = self.locator.find_test(name).await? {
            log::info!("found test {}", test.id);
            return Ok(test);
        }

        log::info!("creating a new test...");
        let created = self.client.create_load_test(name).await?;
        log::info!("created test {}", created.id);

        let test = created.with_canonical_fields(name);

        log::info!("renaming test...");
        self.client.update_load_test(&test).await?;

        Ok(test)
    }

    /// Make the test run the uploaded artifact.
    ///
    /// A script already linked to the test is reloaded in place, keeping its identifier and its
    /// link. Otherwise a new script is created and linked to the test.
    pub async fn ensure_script(
        &self,
        test_id: &ResourceId,
        artifact_id: &ResourceId,
    ) -> LaunchResult<ScriptBinding> {
        log::info!("checking if a script already exists for test {test_id}...");

        if let Some(link) = self.locator.find_test_script(test_id).await? {
            log::info!("found script {}", link.load_script);

            let reload = ScriptReload::new(
                link.load_script.clone(),
                artifact_id.clone(),
                test_id.clone(),
            );
            let reloaded = self.client.reload_script(&reload).await?;
            if reloaded.id != link.load_script {
                log::warn!(
                    "reload of script {} answered with id {}, keeping the linked id",
                    link.load_script,
                    reloaded.id
                );
            }
            log::info!("reloaded script {}", link.load_script);

            return Ok(ScriptBinding {
                script_id: link.load_script,
                link_id: link.id,
                origin: ScriptOrigin::Reloaded,
            });
        }

        log::info!("creating a new script...");
        let script = self.client.create_script(SCRIPT_NAME, artifact_id).await?;
        log::info!("created script {}", script.id);

        log::info!("linking the script to the test...");
        let payload = ScriptTestLinkPayload::new(
            None,
            test_id.clone(),
            script.id.clone(),
            NEW_LINK_NAME,
            &LinkPolicy::default(),
        );
        let link = self.client.link_script(&payload).await?;
        log::info!("linked script {} to test {test_id} as {}", script.id, link.id);

        Ok(ScriptBinding {
            script_id: script.id,
            link_id: link.id,
            origin: ScriptOrigin::Created,
        })
    }
}
