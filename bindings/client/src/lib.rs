mod client;
mod error;
mod model;
mod session;

pub mod prelude {
    pub use crate::client::LoadTestClientInstrumented as LoadTestClient;
    pub use crate::error::{check_response, handle_http_err};
    pub use crate::model::{
        ArtifactRef, Breakdown, Created, GeographyEntry, LinkPolicy, MetricSeries, ResourceId,
        RunRef, RunStatus, ScriptReload, ScriptResource, ScriptTestLink, ScriptTestLinkPayload,
        TestResource, TimePoint, TimeSeries, SCRIPT_NAME, TEST_NAME,
    };
    pub use crate::session::{ConnectionOptions, Session};
}
