mod test_model;
mod test_overlay;
mod test_pipeline;
mod test_projection;
mod test_sampling;
mod test_silhouette;

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("debug");

        // don't panic if called multiple times across binaries
        let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
    });
}
