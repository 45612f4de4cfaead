//! TW-026: WebApp: the user-facing application. Cloud: function with a
//! public URL. Local: dev server on a fixed port. One per stack.
//!
//! Dependency endpoints arrive as environment variables; the caller passes
//! resolved values so the app never branches on the environment.

use crate::cloud::{self, CloudResource};
use crate::core::allocator;
use crate::core::construct::{Construct, Contribution, HasConstruct, Resource, Scope};
use crate::core::endpoint::Endpoint;
use crate::core::error::SynthResult;
use crate::core::types::{DependencyCondition, HealthCheck, ServiceSpec};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Fixed host port of the local dev server.
pub const WEBAPP_PORT: u16 = allocator::WEB_APP_PORT;
pub const WEBAPP_HOST: &str = "webapp.local";
pub const HEALTHCHECK_PATH: &str = "/api/healthcheck";

#[derive(Debug)]
pub struct WebApp {
    /// Application directory (relative to the project root)
    app_dir: PathBuf,
    environment: IndexMap<String, String>,
    endpoint: Endpoint,
}

impl WebApp {
    /// Declare the stack's web app. `environment` is passed to the app on
    /// both targets.
    pub fn declare(
        scope: &mut Scope<'_>,
        id: &str,
        app_dir: &Path,
        environment: IndexMap<String, String>,
    ) -> SynthResult<Construct<WebApp>> {
        scope.construct_unique("WebApp", id, |base| WebApp {
            app_dir: app_dir.to_path_buf(),
            environment,
            endpoint: Endpoint::new(base.path(), base.environment()),
        })
    }

    pub fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }

    fn variables(&self, cx: &Contribution<'_>) -> IndexMap<String, String> {
        let mut vars = IndexMap::new();
        vars.insert("FRAMEWORK_ENVIRONMENT".to_string(), cx.environment().to_string());
        vars.extend(self.environment.clone());
        vars
    }
}

impl Construct<WebApp> {
    /// Start the app only once `dependency` is ready.
    pub fn wait_for(
        &self,
        scope: &mut Scope<'_>,
        dependency: &dyn HasConstruct,
    ) -> SynthResult<DependencyCondition> {
        scope.wait_for(self, dependency)
    }
}

impl Resource for WebApp {
    /// Public URL for the active environment.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        let variables: Map<String, Value> = self
            .variables(cx)
            .iter()
            .map(|(k, v)| (k.clone(), cloud::sub_value(v)))
            .collect();
        let function = cx.add_cloud_resource(
            "Server",
            CloudResource::new("AWS::Lambda::Function")
                .property("Runtime", "nodejs22.x")
                .property("Handler", "index.handler")
                .property("MemorySize", 1024)
                .property("Environment", json!({ "Variables": variables })),
        )?;
        let url = cx.add_cloud_resource(
            "Url",
            CloudResource::new("AWS::Lambda::Url")
                .sub_property("TargetFunctionArn", &cloud::attr(&function, "Arn"))
                .property("AuthType", "NONE"),
        )?;
        self.endpoint.set_remote(cloud::attr(&url, "FunctionUrl"));
        cx.add_cloud_output("AppUrl", self.endpoint.remote().unwrap_or_default())?;
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        cx.reserve_port(WEBAPP_PORT)?;
        self.endpoint
            .set_local(format!("http://{}:{}", WEBAPP_HOST, WEBAPP_PORT));

        let mut spec = ServiceSpec::image(cx.base().service_name(), "node", Some("alpine"))
            .user("1000")
            .env("PORT", WEBAPP_PORT.to_string());
        for (k, v) in self.variables(cx) {
            spec = spec.env(&k, v);
        }
        let app_dir = cx.config().resolve(&self.app_dir);
        let spec = spec
            .command("sh -c 'cd /app && npm run dev'")
            .port(WEBAPP_PORT, WEBAPP_PORT)
            .alias(WEBAPP_HOST)
            .volume(cx.volume_source(&app_dir), "/app")
            .health_check(HealthCheck::shell(format!(
                "wget -q --spider http://localhost:{}{} || exit 1",
                WEBAPP_PORT, HEALTHCHECK_PATH
            )));
        Ok(Some(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::candidate_port;
    use crate::core::app::App;
    use crate::core::config::AppConfig;
    use crate::core::error::SynthError;
    use crate::core::naming::seed_hash;
    use crate::core::types::Environment;
    use crate::resources::{Postgres, Queue};

    fn env(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_tw026_local_service() {
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development));
        let mut stack = app.stack("MainStack").unwrap();
        let db = Postgres::declare(&mut stack, "Postgres").unwrap();
        let vars = env(&[("POSTGRES_URL", db.endpoint().unwrap())]);
        let web = WebApp::declare(&mut stack, "Web", Path::new("app"), vars).unwrap();
        assert_eq!(web.endpoint().unwrap(), "http://webapp.local:4000");
        assert_eq!(web.wait_for(&mut stack, &db).unwrap(), DependencyCondition::Healthy);

        let spec = stack.local_service(&web).unwrap();
        assert_eq!(spec.environment["FRAMEWORK_ENVIRONMENT"], "development");
        assert_eq!(spec.environment["POSTGRES_URL"], db.endpoint().unwrap());
        assert_eq!(spec.volumes[0].source, "../app");
        assert!(spec.health_check.as_ref().unwrap().test[1].contains("/api/healthcheck"));
        drop(stack);
        assert!(app.session().allocator().is_taken(WEBAPP_PORT));
    }

    #[test]
    fn test_tw026_remote_environment_uses_sub() {
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Production));
        let mut stack = app.stack("MainStack").unwrap();
        let db = Postgres::declare(&mut stack, "Postgres").unwrap();
        let vars = env(&[("POSTGRES_URL", db.endpoint().unwrap())]);
        let web = WebApp::declare(&mut stack, "Web", Path::new("app"), vars).unwrap();
        assert!(web.endpoint().unwrap().ends_with(".FunctionUrl}"));
        drop(stack);

        let stack = app.cloud_stack("MainStack").unwrap();
        let server = format!("WebServer{}", web.base().short_id());
        let props = &stack.resource(&server).unwrap().properties;
        let pg = &props["Environment"]["Variables"]["POSTGRES_URL"];
        assert!(pg["Fn::Sub"].as_str().unwrap().contains(".dsql."));
        assert_eq!(props["Environment"]["Variables"]["FRAMEWORK_ENVIRONMENT"], "production");
    }

    #[test]
    fn test_tw026_fixed_port_not_taken_by_earlier_allocation() {
        // an id whose seed lands on the web app port
        let id = (0u32..)
            .map(|i| format!("Db{}", i))
            .find(|id| candidate_port(u64::from(seed_hash(id))) == WEBAPP_PORT)
            .unwrap();
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development));
        let mut stack = app.stack("MainStack").unwrap();
        let db = Postgres::declare(&mut stack, &id).unwrap();
        assert_ne!(db.local_port(), Some(WEBAPP_PORT));
        let web = WebApp::declare(&mut stack, "Web", Path::new("app"), IndexMap::new()).unwrap();
        assert_eq!(web.endpoint().unwrap(), "http://webapp.local:4000");
    }

    #[test]
    fn test_tw026_failed_declare_keeps_slot_free() {
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development));
        let mut stack = app.stack("MainStack").unwrap();
        Queue::declare(&mut stack, "Web").unwrap();
        let err = WebApp::declare(&mut stack, "Web", Path::new("app"), IndexMap::new()).unwrap_err();
        assert!(matches!(err, SynthError::DuplicateId { .. }));
        let web = WebApp::declare(&mut stack, "Site", Path::new("app"), IndexMap::new()).unwrap();
        assert_eq!(web.base().path(), "MainStack/Site");
    }

    #[test]
    fn test_tw026_one_per_stack() {
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development));
        let mut stack = app.stack("MainStack").unwrap();
        WebApp::declare(&mut stack, "Web", Path::new("app"), IndexMap::new()).unwrap();
        let err = WebApp::declare(&mut stack, "Admin", Path::new("admin"), IndexMap::new()).unwrap_err();
        assert!(matches!(err, SynthError::UnsupportedOperation { .. }));
    }
}
