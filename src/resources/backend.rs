//! TW-027: Reference backend topology built by `twinform synth`.

use super::{MicroService, Postgres, Queue, Storage, TriggerScript, WebApp, Workflow};
use crate::core::app::App;
use crate::core::construct::Construct;
use crate::core::error::SynthResult;
use indexmap::IndexMap;
use std::path::Path;

/// Stack id used when none is configured.
pub const DEFAULT_STACK: &str = "BackendStack";

/// Handles to every construct of the reference backend.
#[derive(Debug)]
pub struct Backend {
    pub postgres: Construct<Postgres>,
    pub queue: Construct<Queue>,
    pub storage: Construct<Storage>,
    pub crawler: Construct<MicroService>,
    pub pipeline: Construct<Workflow>,
    pub seed: Construct<TriggerScript>,
    pub web: Construct<WebApp>,
}

/// Declare the backend in a new stack `stack_id`.
///
/// The seed script waits for the database and must finish before the web
/// app starts; the web app also waits for its queue and storage.
pub fn declare_backend(app: &mut App, stack_id: &str) -> SynthResult<Backend> {
    let mut stack = app.stack(stack_id)?;

    let postgres = Postgres::declare(&mut stack, "Postgres")?;
    let queue = Queue::declare(&mut stack, "Jobs")?;
    let storage = Storage::declare(&mut stack, "Assets")?;
    let crawler = MicroService::declare(&mut stack, "Crawler", Path::new("lambdas/crawler"))?;
    let pipeline = Workflow::declare(&mut stack, "Pipeline")?;
    let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed"))?;

    let mut env = IndexMap::new();
    env.insert("POSTGRES_URL".to_string(), postgres.endpoint()?.to_string());
    env.insert("QUEUE_URL".to_string(), queue.endpoint()?.to_string());
    env.insert("STORAGE_URL".to_string(), storage.endpoint()?.to_string());
    env.insert("CRAWLER_URL".to_string(), crawler.endpoint()?.to_string());
    env.insert("PIPELINE_ARN".to_string(), pipeline.endpoint()?.to_string());
    let web = WebApp::declare(&mut stack, "Web", Path::new("app"), env)?;

    seed.run_after(&mut stack, &postgres)?;
    seed.run_before(&mut stack, &web)?;
    web.wait_for(&mut stack, &queue)?;
    web.wait_for(&mut stack, &storage)?;
    web.wait_for(&mut stack, &crawler)?;

    Ok(Backend {
        postgres,
        queue,
        storage,
        crawler,
        pipeline,
        seed,
        web,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::construct::{HasConstruct, Resource};
    use crate::core::types::{DependencyCondition, Environment};
    use crate::core::wiring;

    fn app(root: &Path, env: Environment) -> App {
        App::new(AppConfig::for_root(root, env))
    }

    /// Development resolves to the local value, production to the remote one.
    fn assert_resolves<R: Resource>(c: &Construct<R>, env: Environment) {
        let endpoint = c.resource().endpoint();
        let expected = match env {
            Environment::Development => endpoint.local(),
            Environment::Production => endpoint.remote(),
        };
        assert!(expected.is_some(), "{} has no value for {}", c.base().path(), env);
        assert_eq!(c.endpoint().ok(), expected, "{}", c.base().path());
    }

    #[test]
    fn test_tw027_every_endpoint_follows_environment() {
        for env in [Environment::Development, Environment::Production] {
            let mut app = app(Path::new("/proj"), env);
            let b = declare_backend(&mut app, DEFAULT_STACK).unwrap();
            assert_resolves(&b.postgres, env);
            assert_resolves(&b.queue, env);
            assert_resolves(&b.storage, env);
            assert_resolves(&b.crawler, env);
            assert_resolves(&b.pipeline, env);
            assert_resolves(&b.seed, env);
            assert_resolves(&b.web, env);

            let emulator = b.pipeline.emulator().unwrap();
            let lambda = emulator.lambda().unwrap();
            let local_only = env == Environment::Development;
            assert_eq!(emulator.endpoint().is_ok(), local_only);
            assert_eq!(lambda.endpoint().is_ok(), local_only);
        }
    }

    #[test]
    fn test_tw027_service_order() {
        let mut app = app(Path::new("/proj"), Environment::Development);
        let b = declare_backend(&mut app, DEFAULT_STACK).unwrap();
        let order = wiring::service_order(app.manifest()).unwrap();
        let pos = |c: &dyn HasConstruct| {
            let name = c.construct_ref().service_name();
            order.iter().position(|n| *n == name).unwrap()
        };
        assert!(pos(&b.postgres) < pos(&b.seed));
        assert!(pos(&b.seed) < pos(&b.web));
        assert!(pos(&b.crawler) < pos(&b.web));
        // web, seed, crawler, queue, storage, postgres, workflow, two emulators
        assert_eq!(order.len(), 9);
    }

    #[test]
    fn test_tw027_web_dependencies() {
        let mut app = app(Path::new("/proj"), Environment::Development);
        let b = declare_backend(&mut app, DEFAULT_STACK).unwrap();
        let deps = app.manifest().dependencies(&b.web.base().service_name());
        let seed = b.seed.base().service_name();
        assert!(deps.contains(&(seed.as_str(), DependencyCondition::CompletedSuccessfully)));
        let crawler = b.crawler.base().service_name();
        assert!(deps.contains(&(crawler.as_str(), DependencyCondition::Healthy)));
        assert_eq!(deps.len(), 4);
    }

    #[test]
    fn test_tw027_synthesis_is_reproducible() {
        let render = || {
            let dir = tempfile::tempdir().unwrap();
            let mut app = app(dir.path(), Environment::Development);
            declare_backend(&mut app, DEFAULT_STACK).unwrap();
            app.synthesize().unwrap();
            let manifest = std::fs::read_to_string(app.config().manifest_path.clone()).unwrap();
            let template = std::fs::read_to_string(
                app.config().cloud_out_dir.join("BackendStack.template.json"),
            )
            .unwrap();
            (manifest, template)
        };
        let first = render();
        let second = render();
        assert_eq!(first, second);
        assert!(first.0.starts_with("# This file is auto-generated.\n# Do not modify directly.\n"));
    }
}
