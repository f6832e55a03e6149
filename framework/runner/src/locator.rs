use truapi_client::prelude::{LoadTestClient, ResourceId, ScriptTestLink, TestResource};
use truapi_core::prelude::LaunchResult;

/// Finds resources that already exist on the remote side, so that a fresh invocation can reuse
/// what an earlier one created.
pub struct ResourceLocator<'a> {
    client: &'a LoadTestClient,
}

impl<'a> ResourceLocator<'a> {
    pub fn new(client: &'a LoadTestClient) -> Self {
        Self { client }
    }

    /// The test whose name is exactly `name`.
    ///
    /// When several tests share the name, the first one in listing order wins. The service does
    /// not promise a stable listing order.
    pub async fn find_test(&self, name: &str) -> LaunchResult<Option<TestResource>> {
        let tests = self.client.list_load_tests().await?;

        Ok(first_match(tests, name, |test| test.name.as_str()))
    }

    /// The script linked to a test. A test carries at most one script in this workflow, so the
    /// first link is the one.
    pub async fn find_test_script(
        &self,
        test_id: &ResourceId,
    ) -> LaunchResult<Option<ScriptTestLink>> {
        let links = self.client.list_test_scripts(test_id).await?;
        if links.len() > 1 {
            log::warn!(
                "test {test_id} has {} linked scripts, using the first one",
                links.len()
            );
        }

        Ok(links.into_iter().next())
    }
}

pub(crate) fn first_match<R>(
    items: Vec<R>,
    name: &str,
    name_of: impl Fn(&R) -> &str,
) -> Option<R> {
    let mut matches = items.into_iter().filter(|item| name_of(item) == name);
    let first = matches.next();

    let others = matches.count();
    if others > 0 {
        log::warn!(
            "found {} resources named `{name}`, using the first one",
            others + 1
        );
    }

    first
}
