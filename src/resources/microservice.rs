//! TW-023: MicroService: container-image function in the cloud, a locally
//! built container with an HTTP health probe.

use crate::cloud::{self, CloudResource};
use crate::core::construct::{Construct, Contribution, Resource, Scope};
use crate::core::endpoint::Endpoint;
use crate::core::error::SynthResult;
use crate::core::types::{HealthCheck, ServiceSpec};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct MicroService {
    /// Build context (relative to the project root)
    function_path: PathBuf,
    endpoint: Endpoint,
    function_name: Option<String>,
    port: Option<u16>,
}

impl MicroService {
    pub fn declare(
        scope: &mut Scope<'_>,
        id: &str,
        function_path: &Path,
    ) -> SynthResult<Construct<MicroService>> {
        scope.construct(id, |base| MicroService {
            function_path: function_path.to_path_buf(),
            endpoint: Endpoint::new(base.path(), base.environment()),
            function_name: None,
            port: None,
        })
    }

    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.port
    }
}

impl Resource for MicroService {
    /// Function ARN in production, local URL in development.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        let name = cx.base().scoped_name("MicroService");
        let image = format!(
            "${{AWS::AccountId}}.dkr.ecr.{}.amazonaws.com/{}:latest",
            cx.region(),
            name.to_ascii_lowercase()
        );
        let function = cx.add_cloud_resource(
            "Function",
            CloudResource::new("AWS::Lambda::Function")
                .property("PackageType", "Image")
                .property("FunctionName", name.as_str())
                .property("Timeout", 60)
                .property("MemorySize", 2048)
                .property("Code", json!({ "ImageUri": cloud::sub_value(&image) })),
        )?;
        self.endpoint.set_remote(cloud::attr(&function, "Arn"));
        self.function_name = Some(name);
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        let seed = cx.base().scoped_name("MicroService");
        let port = cx.allocate_port(seed)?;
        let host = cx.base().scoped_host("microservice.local");
        self.endpoint.set_local(format!("http://{}:{}", host, port));
        self.port = Some(port);

        let spec = ServiceSpec::build(cx.base().service_name(), cx.volume_source(&self.function_path))
            .env("PORT", port.to_string())
            .port(port, port)
            .alias(host)
            .health_check(
                HealthCheck::shell(format!("curl -f http://localhost:{}/health || exit 1", port))
                    .interval("30s")
                    .timeout("5s")
                    .retries(3)
                    .start_period("1s"),
            );
        Ok(Some(spec))
    }
}
