use truapi_runner::prelude::{init, run, TruapiResult};

fn main() -> TruapiResult<()> {
    let cli = init();

    run(cli)
}
