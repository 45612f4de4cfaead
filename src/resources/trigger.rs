//! TW-024: TriggerScript: a one-shot task ordered relative to other
//! constructs. Cloud: function plus trigger resource. Local: a node runner
//! that exits when done.

use crate::cloud::{self, CloudResource};
use crate::core::construct::{Construct, Contribution, HasConstruct, Resource, Scope};
use crate::core::endpoint::Endpoint;
use crate::core::error::SynthResult;
use crate::core::naming;
use crate::core::types::{local_arn, DependencyCondition, RestartPolicy, ServiceSpec};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct TriggerScript {
    /// Script directory (relative to the project root)
    script_path: PathBuf,
    endpoint: Endpoint,
    function_name: Option<String>,
    trigger_id: Option<String>,
}

impl TriggerScript {
    pub fn declare(
        scope: &mut Scope<'_>,
        id: &str,
        script_path: &Path,
    ) -> SynthResult<Construct<TriggerScript>> {
        scope.construct(id, |base| TriggerScript {
            script_path: script_path.to_path_buf(),
            endpoint: Endpoint::new(base.path(), base.environment()),
            function_name: None,
            trigger_id: None,
        })
    }

    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    /// Logical id of the trigger resource.
    pub fn trigger_id(&self) -> Option<&str> {
        self.trigger_id.as_deref()
    }
}

impl Construct<TriggerScript> {
    /// Run once `other` is ready: healthy if it has a health check,
    /// completed if it is itself one-shot, started otherwise.
    pub fn run_after(
        &self,
        scope: &mut Scope<'_>,
        other: &dyn HasConstruct,
    ) -> SynthResult<DependencyCondition> {
        scope.wait_for(self, other)
    }

    /// Hold `other` back until this script completed successfully.
    pub fn run_before(&self, scope: &mut Scope<'_>, other: &dyn HasConstruct) -> SynthResult<()> {
        scope.depends_on(other, self, DependencyCondition::CompletedSuccessfully)
    }
}

impl Resource for TriggerScript {
    /// ARN of the function that runs the script.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        let name = cx.base().scoped_name("script");
        let function = cx.add_cloud_resource(
            "TriggerFunction",
            CloudResource::new("AWS::Lambda::Function")
                .property("FunctionName", name.as_str())
                .property("Runtime", "nodejs22.x")
                .property("Handler", "index.handler")
                .property("Timeout", 300)
                .property("MemorySize", 1024),
        )?;
        let trigger = cx.add_cloud_resource(
            "Trigger",
            CloudResource::new("Custom::Trigger")
                .sub_property("HandlerArn", &cloud::attr(&function, "Arn"))
                .property("InvocationType", "RequestResponse")
                .property("Timeout", json!(300_000)),
        )?;
        self.endpoint.set_remote(cloud::attr(&function, "Arn"));
        self.function_name = Some(name);
        self.trigger_id = Some(trigger);
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        let script_dir = cx.config().resolve(&self.script_path);
        let mount = format!("/{}", naming::short_hash(&self.script_path.to_string_lossy()));
        let modules = cx.config().root_dir.join("node_modules");
        let name = cx.base().scoped_name("script");
        self.endpoint
            .set_local(local_arn("lambda", &format!("function:{}", name)));

        let spec = ServiceSpec::image(cx.base().service_name(), "node", Some("alpine"))
            .command("npx tsx index.ts")
            .restart(RestartPolicy::No)
            .working_dir(mount.as_str())
            .volume(cx.volume_source(&script_dir), mount.as_str())
            .volume(cx.volume_source(&modules), format!("{}/node_modules", mount));
        Ok(Some(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::App;
    use crate::core::config::AppConfig;
    use crate::core::types::Environment;
    use crate::resources::{MicroService, Postgres, Queue};

    fn app() -> App {
        App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development))
    }

    #[test]
    fn test_tw024_endpoints() {
        let mut app = app();
        let mut stack = app.stack("MainStack").unwrap();
        let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed")).unwrap();
        assert_eq!(
            seed.endpoint().unwrap(),
            format!(
                "arn:aws:lambda:us-east-1:123456789012:function:{}",
                seed.function_name().unwrap()
            )
        );

        let mut prod = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Production));
        let mut stack = prod.stack("MainStack").unwrap();
        let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed")).unwrap();
        let function = format!("SeedTriggerFunction{}", seed.base().short_id());
        assert_eq!(seed.endpoint().unwrap(), format!("${{{}.Arn}}", function));
    }

    #[test]
    fn test_tw024_local_service() {
        let mut app = app();
        let mut stack = app.stack("MainStack").unwrap();
        let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed")).unwrap();
        let spec = stack.local_service(&seed).unwrap();
        assert_eq!(spec.restart, Some(RestartPolicy::No));
        assert_eq!(spec.volumes[0].source, "../scripts/seed");
        assert_eq!(spec.volumes[1].source, "../node_modules");
        assert_eq!(spec.working_dir.as_deref(), Some(spec.volumes[0].target.as_str()));
    }

    #[test]
    fn test_tw024_run_after_picks_condition() {
        let mut app = app();
        let mut stack = app.stack("MainStack").unwrap();
        let db = Postgres::declare(&mut stack, "Postgres").unwrap();
        let queue = Queue::declare(&mut stack, "Jobs").unwrap();
        let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed")).unwrap();
        let other = TriggerScript::declare(&mut stack, "Migrate", Path::new("scripts/migrate")).unwrap();

        assert_eq!(seed.run_after(&mut stack, &db).unwrap(), DependencyCondition::Healthy);
        assert_eq!(seed.run_after(&mut stack, &queue).unwrap(), DependencyCondition::Started);
        assert_eq!(
            seed.run_after(&mut stack, &other).unwrap(),
            DependencyCondition::CompletedSuccessfully
        );
        drop(stack);
        let deps = app.manifest().dependencies(&seed.base().service_name());
        assert_eq!(deps.len(), 3);
    }

    #[test]
    fn test_tw024_run_before() {
        let mut app = app();
        let mut stack = app.stack("MainStack").unwrap();
        let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed")).unwrap();
        let svc = MicroService::declare(&mut stack, "Api", Path::new("api")).unwrap();
        seed.run_before(&mut stack, &svc).unwrap();
        drop(stack);
        let deps = app.manifest().dependencies(&svc.base().service_name());
        assert_eq!(
            deps,
            vec![(seed.base().service_name().as_str(), DependencyCondition::CompletedSuccessfully)]
        );
    }

    #[test]
    fn test_tw024_cloud_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(AppConfig::for_root(dir.path(), Environment::Production));
        let (seed_trigger, db_cluster) = {
            let mut stack = app.stack("MainStack").unwrap();
            let db = Postgres::declare(&mut stack, "Postgres").unwrap();
            let seed = TriggerScript::declare(&mut stack, "Seed", Path::new("scripts/seed")).unwrap();
            seed.run_after(&mut stack, &db).unwrap();
            (
                seed.trigger_id().unwrap().to_string(),
                format!("PostgresDsqlCluster{}", db.base().short_id()),
            )
        };
        app.synthesize().unwrap();
        let stack = app.cloud_stack("MainStack").unwrap();
        assert!(stack.resource(&seed_trigger).unwrap().depends_on.contains(&db_cluster));
    }
}
