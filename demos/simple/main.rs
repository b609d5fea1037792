use flags::{EngineConfig, EvaluationContext, EvaluationEvent};

pub fn main() -> flags::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("flags=debug")).init();

    // API_KEYS and FLAGS_LOCATION (plus optional FLAG_FORMAT, READ_INTERVAL, READ_TOKEN) come
    // from the environment.
    let mut config = EngineConfig::from_env()?;
    config.evaluation_logger(|event: EvaluationEvent| {
        log::info!(target: "flags", event:serde; "evaluation");
    });
    let engine = config.to_engine();

    // Start a poller thread to keep flags in sync with the source.
    let poller = engine.start_poller_thread()?;

    // Block waiting for the first read. Until it completes, every flag resolves to
    // FLAG_NOT_FOUND.
    poller.wait_for_configuration()?;

    let credential = format!(
        "Bearer {}",
        std::env::var("DEMO_TOKEN").unwrap_or_else(|_| "mytoken".to_owned())
    );
    let context = EvaluationContext::new("123456").with_attribute("email", "jane@company.com");

    let result = engine.resolve_boolean(&credential, "bool_query", false, &context);
    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());

    let bulk = engine.resolve_all(&credential, &context);
    println!("{}", serde_json::to_string_pretty(&bulk).unwrap_or_default());

    poller.shutdown()
}
