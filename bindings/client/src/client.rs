use std::path::Path;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use truapi_core::prelude::{LaunchError, LaunchResult};
use truapi_instruments::Reporter;
use truapi_instruments_derive::truapi_instrument;

use crate::error::{check_response, handle_http_err};
use crate::model::{
    Created, GeographyEntry, ResourceId, RunStatus, ScriptReload, ScriptResource, ScriptTestLink,
    ScriptTestLinkPayload, TestResource, TimeSeries,
};
use crate::session::Session;

/// Typed access to every endpoint the workflow and the run reporter use.
///
/// Each call is timed and reported under its operation label, the same label that a failure of
/// the call carries.
#[derive(Clone)]
pub struct LoadTestClientInstrumented {
    session: Session,
    reporter: Arc<Reporter>,
}

impl std::fmt::Debug for LoadTestClientInstrumented {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadTestClientInstrumented")
            .field("session", &self.session)
            .finish()
    }
}

impl LoadTestClientInstrumented {
    pub fn new(session: Session, reporter: Arc<Reporter>) -> Self {
        Self { session, reporter }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    #[truapi_instrument(operation = "fetch test")]
    pub async fn list_load_tests(&self) -> LaunchResult<Vec<TestResource>> {
        let request = self.session.request(Method::GET, "load-tests")?;
        send_json("fetch test", request).await
    }

    #[truapi_instrument(operation = "create test")]
    pub async fn create_load_test(&self, name: &str) -> LaunchResult<TestResource> {
        let request = self
            .session
            .request(Method::POST, "load-tests")?
            .json(&json!({ "name": name }));
        send_json("create test", request).await
    }

    /// Full overwrite of a test definition.
    #[truapi_instrument(operation = "rename test")]
    pub async fn update_load_test(&self, test: &TestResource) -> LaunchResult<()> {
        let request = self
            .session
            .request(Method::PUT, &format!("load-tests/{}", test.id))?
            .json(test);
        send_empty("rename test", request).await
    }

    /// The scripts linked to a test.
    #[truapi_instrument(operation = "fetch script")]
    pub async fn list_test_scripts(&self, test_id: &ResourceId) -> LaunchResult<Vec<ScriptTestLink>> {
        let request = self
            .session
            .request(Method::GET, &format!("load-tests/{test_id}/scripts"))?;
        send_json("fetch script", request).await
    }

    #[truapi_instrument(operation = "create script")]
    pub async fn create_script(
        &self,
        name: &str,
        artifact_id: &ResourceId,
    ) -> LaunchResult<ScriptResource> {
        let request = self
            .session
            .request(Method::POST, "scripts")?
            .json(&json!({ "name": name, "file": artifact_id }));
        send_json("create script", request).await
    }

    #[truapi_instrument(operation = "reload script")]
    pub async fn reload_script(&self, reload: &ScriptReload) -> LaunchResult<ScriptResource> {
        let request = self
            .session
            .request(Method::PUT, &format!("scripts/{}", reload.id))?
            .json(reload);
        send_json("reload script", request).await
    }

    #[truapi_instrument(operation = "link script to test")]
    pub async fn link_script(&self, payload: &ScriptTestLinkPayload) -> LaunchResult<Created> {
        let request = self
            .session
            .request(
                Method::POST,
                &format!("load-tests/{}/scripts/{}", payload.load_test, payload.load_script),
            )?
            .json(payload);
        send_json("link script to test", request).await
    }

    /// Overwrite the policy fields of an existing link.
    #[truapi_instrument(operation = "configure")]
    pub async fn configure_script_link(&self, payload: &ScriptTestLinkPayload) -> LaunchResult<()> {
        let request = self
            .session
            .request(
                Method::PUT,
                &format!("load-tests/{}/scripts/{}", payload.load_test, payload.load_script),
            )?
            .json(payload);
        send_empty("configure", request).await
    }

    /// Upload a local file as a new artifact. The file is read fully into memory.
    #[truapi_instrument(operation = "upload file")]
    pub async fn upload_file(&self, path: &Path) -> LaunchResult<Created> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| LaunchError::local_io("read artifact", e))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact.zip".to_string());

        log::debug!("uploading {} ({} bytes)", file_name, content.len());

        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str("application/zip")
            .map_err(|e| handle_http_err("upload file", e))?;
        let request = self
            .session
            .request(Method::POST, "files")?
            .multipart(Form::new().part("file", part));
        send_json("upload file", request).await
    }

    #[truapi_instrument(operation = "configure geographies")]
    pub async fn get_distribution(&self, test_id: &ResourceId) -> LaunchResult<Vec<GeographyEntry>> {
        let request = self
            .session
            .request(Method::GET, &format!("load-tests/{test_id}/distribution"))?;
        send_json("configure geographies", request).await
    }

    #[truapi_instrument(operation = "set geography")]
    pub async fn set_geography(
        &self,
        test_id: &ResourceId,
        entry: &GeographyEntry,
    ) -> LaunchResult<()> {
        let request = self
            .session
            .request(
                Method::PUT,
                &format!("load-tests/{test_id}/distribution/{}", entry.id),
            )?
            .json(entry);
        send_empty("set geography", request).await
    }

    #[truapi_instrument(operation = "start run")]
    pub async fn start_run(&self, test_id: &ResourceId) -> LaunchResult<Created> {
        let request = self
            .session
            .request(Method::POST, &format!("load-tests/{test_id}/run"))?
            .json(&json!({ "sendEmail": false }));
        send_json("start run", request).await
    }

    #[truapi_instrument(operation = "stop run")]
    pub async fn stop_run(&self, run_id: &ResourceId) -> LaunchResult<()> {
        let request = self
            .session
            .request(Method::DELETE, &format!("test-runs/{run_id}"))?;
        send_empty("stop run", request).await
    }

    #[truapi_instrument(operation = "get test status")]
    pub async fn get_run_status(&self, run_id: &ResourceId) -> LaunchResult<RunStatus> {
        let request = self
            .session
            .request(Method::GET, &format!("test-runs/{run_id}/status"))?;
        send_json("get test status", request).await
    }

    #[truapi_instrument(operation = "get time series")]
    pub async fn get_time_series(&self, run_id: &ResourceId, query: &Value) -> LaunchResult<TimeSeries> {
        let request = self
            .session
            .request(Method::GET, &format!("runtime/results/{run_id}"))?
            .query(&[("q", query.to_string())]);
        send_json("get time series", request).await
    }

    #[truapi_instrument(operation = "get errors")]
    pub async fn get_errors(&self, run_id: &ResourceId) -> LaunchResult<Vec<Value>> {
        let request = self
            .session
            .request(Method::GET, &format!("runtime/errors/{run_id}"))?
            .query(&[("q", json!({ "lastTimeStamp": 0 }).to_string())]);
        send_json("get errors", request).await
    }
}

async fn send(operation: &str, request: RequestBuilder) -> LaunchResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| handle_http_err(operation, e))?;

    check_response(operation, response).await
}

async fn send_json<T: DeserializeOwned>(operation: &str, request: RequestBuilder) -> LaunchResult<T> {
    let response = send(operation, request).await?;
    let status = response.status().as_u16();

    response.json::<T>().await.map_err(|e| {
        LaunchError::remote(operation, Some(status), format!("invalid response body: {e}"))
    })
}

/// For calls whose response body is not needed.
async fn send_empty(operation: &str, request: RequestBuilder) -> LaunchResult<()> {
    send(operation, request).await.map(|_| ())
}
