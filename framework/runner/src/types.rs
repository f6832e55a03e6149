/// Error type for the `truapi` binary. Workflow errors convert into it with `?`.
pub type TruapiResult<T> = anyhow::Result<T>;
