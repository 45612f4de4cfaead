//! TW-021: Queue: SQS in the cloud, ElasticMQ locally.

use crate::cloud::{self, CloudResource};
use crate::core::construct::{Construct, Contribution, Resource, Scope};
use crate::core::endpoint::Endpoint;
use crate::core::error::SynthResult;
use crate::core::types::ServiceSpec;

pub const LOCAL_SQS_HOST: &str = "sqs.local";

const ELASTICMQ_CONFIG_TEMPLATE: &str = r#"include classpath("application.conf")

node-address {
    protocol = http
    host = "*"
    port = <PORT>
    context-path = ""
}

rest-sqs {
    enabled = true
    bind-port = <PORT>
    bind-hostname = "0.0.0.0"
    sqs-limits = strict
}

queues {
    <QUEUE_NAME> {
        defaultVisibilityTimeout = 10 seconds
        delay = 0 seconds
        receiveMessageWait = 0 seconds
    }
}"#;

#[derive(Debug)]
pub struct Queue {
    endpoint: Endpoint,
    queue_name: Option<String>,
    port: Option<u16>,
}

impl Queue {
    pub fn declare(scope: &mut Scope<'_>, id: &str) -> SynthResult<Construct<Queue>> {
        scope.construct(id, |base| Queue {
            endpoint: Endpoint::new(base.path(), base.environment()),
            queue_name: None,
            port: None,
        })
    }

    pub fn queue_name(&self) -> Option<&str> {
        self.queue_name.as_deref()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.port
    }
}

/// ElasticMQ config declaring one queue, listening on `port`.
pub fn elasticmq_config(queue_name: &str, port: u16) -> String {
    ELASTICMQ_CONFIG_TEMPLATE
        .replace("<QUEUE_NAME>", queue_name)
        .replace("<PORT>", &port.to_string())
}

impl Resource for Queue {
    /// Queue URL for the active environment.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        let queue = cx.add_cloud_resource("Queue", CloudResource::new("AWS::SQS::Queue"))?;
        self.endpoint.set_remote(cloud::attr(&queue, "QueueUrl"));
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        let queue_name = cx.base().scoped_name("queue");
        let port = cx.allocate_port(queue_name.as_str())?;
        self.endpoint
            .set_local(format!("http://{}:{}/{}", LOCAL_SQS_HOST, port, queue_name));

        // The config travels inline so the service needs no host files.
        let config = serde_json::to_string(&elasticmq_config(&queue_name, port))?;
        let escaped = config.trim_matches('"');
        let command = format!(
            "/bin/sh -c \"echo '{}' > /elastic.conf && java -Dconfig.file=/elastic.conf -jar /opt/elasticmq-server.jar\"",
            escaped
        );

        self.queue_name = Some(queue_name);
        self.port = Some(port);
        let spec = ServiceSpec::image(cx.base().service_name(), "softwaremill/elasticmq-native", Some("latest"))
            .command(command)
            .port(port, port)
            .alias(LOCAL_SQS_HOST);
        Ok(Some(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::App;
    use crate::core::config::AppConfig;
    use crate::core::types::Environment;
    use std::path::Path;

    #[test]
    fn test_tw021_endpoints() {
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Development));
        let mut stack = app.stack("MainStack").unwrap();
        let q = Queue::declare(&mut stack, "Jobs").unwrap();
        let name = q.queue_name().unwrap();
        assert_eq!(name, format!("queue{}", q.base().short_id()));
        assert_eq!(
            q.endpoint().unwrap(),
            format!("http://sqs.local:{}/{}", q.local_port().unwrap(), name)
        );
        let svc = stack.local_service(&q).unwrap();
        assert!(svc.command.as_deref().unwrap().contains(name));
        assert!(svc.health_check.is_none());
    }

    #[test]
    fn test_tw021_two_queues_distinct() {
        let mut app = App::new(AppConfig::for_root(Path::new("/proj"), Environment::Production));
        let mut stack = app.stack("MainStack").unwrap();
        let a = Queue::declare(&mut stack, "Jobs").unwrap();
        let b = Queue::declare(&mut stack, "Events").unwrap();
        assert_ne!(a.local_port(), b.local_port());
        assert!(a.endpoint().unwrap().ends_with(".QueueUrl}"));
    }

    #[test]
    fn test_tw021_config_template() {
        let conf = elasticmq_config("queue1234abcd", 20000);
        assert!(conf.contains("queue1234abcd {"));
        assert!(conf.contains("bind-port = 20000"));
        assert!(!conf.contains('<'));
    }
}
