//! TW-022: Object storage: S3 bucket in the cloud, MinIO locally.

use crate::cloud::{self, CloudResource};
use crate::core::construct::{Construct, Contribution, Resource, Scope};
use crate::core::endpoint::Endpoint;
use crate::core::error::SynthResult;
use crate::core::types::{ServiceSpec, LOCAL_AWS_ACCESS_KEY_ID, LOCAL_AWS_SECRET_ACCESS_KEY};
use std::path::Path;

/// Host directory (relative to the project root) holding bucket data.
const DATA_DIR: &str = ".s3";

#[derive(Debug)]
pub struct Storage {
    endpoint: Endpoint,
    bucket_name: Option<String>,
    port: Option<u16>,
}

impl Storage {
    pub fn declare(scope: &mut Scope<'_>, id: &str) -> SynthResult<Construct<Storage>> {
        scope.construct(id, |base| Storage {
            endpoint: Endpoint::new(base.path(), base.environment()),
            bucket_name: None,
            port: None,
        })
    }

    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket_name.as_deref()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.port
    }
}

impl Resource for Storage {
    /// Bucket URL for the active environment.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        let bucket = cx.add_cloud_resource("Bucket", CloudResource::new("AWS::S3::Bucket"))?;
        self.endpoint
            .set_remote(format!("https://{}", cloud::attr(&bucket, "RegionalDomainName")));
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        // Bucket names must be lowercase DNS labels.
        let bucket = cx.base().service_name().replace(['_', '.'], "-");
        let port = cx.allocate_port(bucket.as_str())?;
        let host = cx.base().scoped_host("s3.local");
        self.endpoint
            .set_local(format!("http://{}:{}/{}", host, port, bucket));

        let data_dir = Path::new(DATA_DIR).join(&bucket);
        let spec = ServiceSpec::image(cx.base().service_name(), "minio/minio", Some("latest"))
            .env("MINIO_ROOT_USER", LOCAL_AWS_ACCESS_KEY_ID)
            .env("MINIO_ROOT_PASSWORD", LOCAL_AWS_SECRET_ACCESS_KEY)
            .entrypoint("/bin/sh")
            .command(format!(
                "-c 'mkdir -p /data/{} && /usr/bin/minio server /data --address :{}'",
                bucket, port
            ))
            .port(port, port)
            .alias(host)
            .volume(cx.volume_source(&data_dir), "/data");

        self.bucket_name = Some(bucket);
        self.port = Some(port);
        Ok(Some(spec))
    }
}
