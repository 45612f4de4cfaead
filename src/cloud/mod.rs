//! TW-008: Cloud template model and the cloud-synthesis seam.
//!
//! Constructs add resources to their stack's template. Attribute references
//! use `${LogicalId.Attr}` placeholders; any property string containing one
//! is emitted as `Fn::Sub`, so endpoint strings can embed them directly.

use crate::core::error::{SynthError, SynthResult};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Pseudo parameter for the deployment region.
pub const REGION_REF: &str = "${AWS::Region}";

/// `${logical_id.attr}` placeholder.
pub fn attr(logical_id: &str, attr: &str) -> String {
    format!("${{{}.{}}}", logical_id, attr)
}

/// `${logical_id}` placeholder (the resource's primary reference).
pub fn reference(logical_id: &str) -> String {
    format!("${{{}}}", logical_id)
}

/// Property value for a string, wrapped in `Fn::Sub` when it contains
/// placeholders.
pub fn sub_value(s: &str) -> Value {
    if s.contains("${") {
        json!({ "Fn::Sub": s })
    } else {
        Value::String(s.to_string())
    }
}

/// One resource in a template.
#[derive(Debug, Clone, Serialize)]
pub struct CloudResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties", skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,

    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl CloudResource {
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties: IndexMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// String property; placeholders become `Fn::Sub`.
    pub fn sub_property(self, key: &str, value: &str) -> Self {
        self.property(key, sub_value(value))
    }
}

/// Stack output.
#[derive(Debug, Clone, Serialize)]
pub struct CloudOutput {
    #[serde(rename = "Value")]
    pub value: Value,
}

/// A deployable template for one stack.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloudTemplate {
    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, CloudResource>,

    #[serde(rename = "Outputs", skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, CloudOutput>,
}

/// A named grouping of resources bound to one deployment context.
#[derive(Debug, Clone)]
pub struct CloudStack {
    pub name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    template: CloudTemplate,
}

impl CloudStack {
    pub fn new(name: &str, account: Option<String>, region: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            account,
            region,
            template: CloudTemplate::default(),
        }
    }

    pub fn template(&self) -> &CloudTemplate {
        &self.template
    }

    /// Region literal if configured, else the region pseudo parameter.
    pub fn region_ref(&self) -> String {
        self.region.clone().unwrap_or_else(|| REGION_REF.to_string())
    }

    pub fn add_resource(&mut self, logical_id: &str, resource: CloudResource) -> SynthResult<()> {
        if self.template.resources.contains_key(logical_id) {
            return Err(SynthError::DuplicateId {
                parent: format!("stack {}", self.name),
                id: logical_id.to_string(),
            });
        }
        self.template
            .resources
            .insert(logical_id.to_string(), resource);
        Ok(())
    }

    pub fn add_output(&mut self, name: &str, value: &str) {
        self.template.outputs.insert(
            name.to_string(),
            CloudOutput {
                value: sub_value(value),
            },
        );
    }

    /// `dependent` is created only after `dependency` exists.
    pub fn add_depends_on(&mut self, dependent: &str, dependency: &str) {
        if dependent == dependency {
            return;
        }
        if let Some(r) = self.template.resources.get_mut(dependent) {
            if !r.depends_on.iter().any(|d| d == dependency) {
                r.depends_on.push(dependency.to_string());
            }
        }
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CloudResource> {
        self.template.resources.get(logical_id)
    }

    pub fn to_json(&self) -> SynthResult<String> {
        Ok(serde_json::to_string_pretty(&self.template)?)
    }
}

/// Turns finished stacks into deployable artifacts. Errors are passed back
/// to the caller of `synthesize()` unchanged.
pub trait CloudSynthesizer {
    fn synthesize(&mut self, stacks: &[&CloudStack]) -> Result<Vec<PathBuf>, String>;
}

/// Writes `<out_dir>/<StackName>.template.json` per stack.
#[derive(Debug, Clone)]
pub struct TemplateWriter {
    out_dir: PathBuf,
}

impl TemplateWriter {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
        }
    }

    pub fn template_path(&self, stack: &str) -> PathBuf {
        self.out_dir.join(format!("{}.template.json", stack))
    }
}

impl CloudSynthesizer for TemplateWriter {
    fn synthesize(&mut self, stacks: &[&CloudStack]) -> Result<Vec<PathBuf>, String> {
        std::fs::create_dir_all(&self.out_dir)
            .map_err(|e| format!("cannot create {}: {}", self.out_dir.display(), e))?;
        let mut written = Vec::new();
        for stack in stacks {
            let path = self.template_path(&stack.name);
            let body = stack.to_json().map_err(|e| e.to_string())?;
            std::fs::write(&path, body)
                .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
            info!(stack = %stack.name, resources = stack.template.resources.len(), path = %path.display(), "wrote cloud template");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tw008_placeholders() {
        assert_eq!(attr("Cluster1", "Identifier"), "${Cluster1.Identifier}");
        assert_eq!(reference("Queue1"), "${Queue1}");
        assert_eq!(sub_value("plain"), Value::String("plain".into()));
        assert_eq!(
            sub_value("${Cluster1.Identifier}.dsql"),
            json!({"Fn::Sub": "${Cluster1.Identifier}.dsql"})
        );
    }

    #[test]
    fn test_tw008_duplicate_logical_id() {
        let mut s = CloudStack::new("MainStack", None, None);
        s.add_resource("Q", CloudResource::new("AWS::SQS::Queue")).unwrap();
        assert!(s.add_resource("Q", CloudResource::new("AWS::SQS::Queue")).is_err());
    }

    #[test]
    fn test_tw008_depends_on_dedup() {
        let mut s = CloudStack::new("MainStack", None, Some("eu-west-1".into()));
        s.add_resource("A", CloudResource::new("AWS::SQS::Queue")).unwrap();
        s.add_resource("B", CloudResource::new("AWS::SQS::Queue")).unwrap();
        s.add_depends_on("A", "B");
        s.add_depends_on("A", "B");
        s.add_depends_on("A", "A");
        assert_eq!(s.resource("A").unwrap().depends_on, vec!["B"]);
        assert_eq!(s.region_ref(), "eu-west-1");
    }

    #[test]
    fn test_tw008_template_json() {
        let mut s = CloudStack::new("MainStack", None, None);
        s.add_resource(
            "Bucket1",
            CloudResource::new("AWS::S3::Bucket").property("VersioningConfiguration", json!({"Status": "Enabled"})),
        )
        .unwrap();
        s.add_output("BucketUrl", &attr("Bucket1", "RegionalDomainName"));
        let v: Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(v["Resources"]["Bucket1"]["Type"], "AWS::S3::Bucket");
        assert!(v["Resources"]["Bucket1"].get("DependsOn").is_none());
        assert_eq!(
            v["Outputs"]["BucketUrl"]["Value"]["Fn::Sub"],
            "${Bucket1.RegionalDomainName}"
        );
    }

    #[test]
    fn test_tw008_template_writer() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = TemplateWriter::new(&dir.path().join("cdk.out"));
        let s = CloudStack::new("MainStack", None, None);
        let paths = w.synthesize(&[&s]).unwrap();
        assert_eq!(paths, vec![dir.path().join("cdk.out/MainStack.template.json")]);
        assert!(paths[0].exists());
    }
}
