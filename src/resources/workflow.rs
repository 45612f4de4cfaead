//! TW-025: Workflow: Step Functions state machine in the cloud; locally a
//! one-shot registration against the Step Functions emulator.
//!
//! The emulators are per-stack singletons: the step-functions emulator
//! waits (healthy) for the lambda emulator, and every workflow waits
//! (healthy) for the step-functions emulator. N workflows share one pair.

use crate::cloud::{self, CloudResource};
use crate::core::allocator;
use crate::core::construct::{Construct, ConstructRef, Contribution, Resource, Scope};
use crate::core::endpoint::Endpoint;
use crate::core::error::SynthResult;
use crate::core::naming;
use crate::core::types::{
    local_arn, DependencyCondition, HealthCheck, RestartPolicy, ServiceSpec, LOCAL_AWS_ACCESS_KEY_ID,
    LOCAL_AWS_ACCOUNT_ID, LOCAL_AWS_REGION, LOCAL_AWS_SECRET_ACCESS_KEY,
};
use serde_json::json;
use std::rc::Rc;

pub const STEP_FUNCTIONS_EMULATOR_ID: &str = "StepFunctionEmulator";
pub const STEP_FUNCTIONS_HOST: &str = "stepfunctions.local";
pub const STEP_FUNCTIONS_PORT: u16 = allocator::STEP_FUNCTIONS_PORT;

pub const LAMBDA_EMULATOR_ID: &str = "LambdaEmulator";
pub const LAMBDA_HOST: &str = "lambda.local";
pub const LAMBDA_PORT: u16 = allocator::LAMBDA_PORT;

/// Function the lambda emulator invokes as its health probe.
pub const LOCAL_HEALTH_FUNCTION: &str = "LocalHealthCheck";

const DUMMY_ROLE: &str = "role/DummyRole";

fn emulator_env(spec: ServiceSpec) -> ServiceSpec {
    spec.env("AWS_ACCESS_KEY_ID", LOCAL_AWS_ACCESS_KEY_ID)
        .env("AWS_SECRET_ACCESS_KEY", LOCAL_AWS_SECRET_ACCESS_KEY)
        .env("AWS_REGION", LOCAL_AWS_REGION)
}

// ============================================================================
// Workflow
// ============================================================================

#[derive(Debug)]
pub struct Workflow {
    endpoint: Endpoint,
    state_machine_name: Option<String>,
    definition: Option<String>,
    emulator: Option<Rc<Construct<StepFunctionEmulator>>>,
}

impl Workflow {
    pub fn declare(scope: &mut Scope<'_>, id: &str) -> SynthResult<Construct<Workflow>> {
        scope.construct(id, |base| Workflow {
            endpoint: Endpoint::new(base.path(), base.environment()),
            state_machine_name: None,
            definition: None,
            emulator: None,
        })
    }

    pub fn state_machine_name(&self) -> Option<&str> {
        self.state_machine_name.as_deref()
    }

    /// State machine definition (Amazon States Language JSON).
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    /// The stack's step-functions emulator this workflow registers with.
    pub fn emulator(&self) -> Option<&Rc<Construct<StepFunctionEmulator>>> {
        self.emulator.as_ref()
    }
}

/// Single Pass state.
fn pass_definition(pass_state: &str) -> String {
    json!({
        "StartAt": pass_state,
        "States": { pass_state: { "Type": "Pass", "End": true } },
    })
    .to_string()
}

impl Resource for Workflow {
    /// State machine ARN for the active environment.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        let name = cx.base().scoped_name("StateMachine");
        let definition = pass_definition(&cx.base().scoped_name("Pass"));
        let machine = cx.add_cloud_resource(
            "StateMachine",
            CloudResource::new("AWS::StepFunctions::StateMachine")
                .property("StateMachineName", name.as_str())
                .property("DefinitionString", definition.as_str()),
        )?;
        self.endpoint.set_remote(cloud::attr(&machine, "Arn"));
        self.state_machine_name = Some(name);
        self.definition = Some(definition);
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        let name = cx.base().scoped_name("StateMachine");
        let definition = self.definition.clone().unwrap_or_else(|| pass_definition("Pass"));
        self.endpoint
            .set_local(local_arn("states", &format!("stateMachine:{}", name)));

        let emulator = cx
            .scope()
            .singleton(STEP_FUNCTIONS_EMULATOR_ID, StepFunctionEmulator::new)?;
        cx.after_local(&emulator, DependencyCondition::Healthy);
        self.emulator = Some(emulator);

        let command = format!(
            "stepfunctions create-state-machine --endpoint-url http://{}:{} --region {} --definition '{}' --name {} --role-arn {}",
            STEP_FUNCTIONS_HOST,
            STEP_FUNCTIONS_PORT,
            LOCAL_AWS_REGION,
            definition,
            name,
            format!("arn:aws:iam::{}:{}", LOCAL_AWS_ACCOUNT_ID, DUMMY_ROLE),
        );
        let spec = emulator_env(ServiceSpec::image(cx.base().service_name(), "amazon/aws-cli", None))
            .alias(cx.base().scoped_host(STEP_FUNCTIONS_HOST))
            .restart(RestartPolicy::No)
            .command(command);
        Ok(Some(spec))
    }
}

// ============================================================================
// Emulators
// ============================================================================

/// Local Step Functions emulator, one per stack. Contributes nothing to the
/// cloud template.
#[derive(Debug)]
pub struct StepFunctionEmulator {
    endpoint: Endpoint,
    lambda: Option<Rc<Construct<LambdaEmulator>>>,
}

impl StepFunctionEmulator {
    fn new(base: &ConstructRef) -> Self {
        Self {
            endpoint: Endpoint::local_only(base.path(), base.environment()),
            lambda: None,
        }
    }

    pub fn lambda(&self) -> Option<&Rc<Construct<LambdaEmulator>>> {
        self.lambda.as_ref()
    }
}

impl Resource for StepFunctionEmulator {
    /// Emulator URL; local only.
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, _cx: &mut Contribution<'_>) -> SynthResult<()> {
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        cx.reserve_port(STEP_FUNCTIONS_PORT)?;
        self.endpoint
            .set_local(format!("http://{}:{}", STEP_FUNCTIONS_HOST, STEP_FUNCTIONS_PORT));
        let lambda = cx.scope().singleton(LAMBDA_EMULATOR_ID, LambdaEmulator::new)?;
        cx.after_local(&lambda, DependencyCondition::Healthy);
        self.lambda = Some(lambda);

        let spec = emulator_env(ServiceSpec::image(
            cx.base().service_name(),
            "amazon/aws-stepfunctions-local",
            None,
        ))
        .env("LAMBDA_ENDPOINT", format!("http://{}:{}", LAMBDA_HOST, LAMBDA_PORT))
        .port(STEP_FUNCTIONS_PORT, STEP_FUNCTIONS_PORT)
        .alias(STEP_FUNCTIONS_HOST)
        .health_check(
            HealthCheck::shell(format!(
                "curl -X POST -H 'x-amz-target: AWSStepFunctions.ListStateMachines' http://{}:{} || exit 1",
                STEP_FUNCTIONS_HOST, STEP_FUNCTIONS_PORT
            ))
            .start_period("5s"),
        );
        Ok(Some(spec))
    }
}

/// Local Lambda emulator serving the stack's own template, one per stack.
#[derive(Debug)]
pub struct LambdaEmulator {
    endpoint: Endpoint,
    health_function: Option<String>,
}

impl LambdaEmulator {
    fn new(base: &ConstructRef) -> Self {
        Self {
            endpoint: Endpoint::local_only(base.path(), base.environment()),
            health_function: None,
        }
    }

    /// Logical id of the probe function in the cloud template.
    pub fn health_function(&self) -> Option<&str> {
        self.health_function.as_deref()
    }
}

impl Resource for LambdaEmulator {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn contribute_cloud(&mut self, cx: &mut Contribution<'_>) -> SynthResult<()> {
        // The emulator reads the stack template, so the probe function has to
        // be part of it.
        let function = cx.add_cloud_resource(
            LOCAL_HEALTH_FUNCTION,
            CloudResource::new("AWS::Lambda::Function")
                .property("FunctionName", LOCAL_HEALTH_FUNCTION)
                .property("Runtime", "nodejs22.x")
                .property("Handler", "index.handler"),
        )?;
        self.health_function = Some(function);
        Ok(())
    }

    fn contribute_local(&mut self, cx: &mut Contribution<'_>) -> SynthResult<Option<ServiceSpec>> {
        cx.reserve_port(LAMBDA_PORT)?;
        let config = cx.config();
        let cloud_out = naming::relative_path(&config.root_dir, &config.resolve(&config.cloud_out_dir));
        let template = format!(
            "/app/{}/{}.template.json",
            cloud_out.to_string_lossy(),
            cx.stack_name()
        );
        let root = config.root_dir.clone();
        let lambda_url = format!("http://{}:{}", LAMBDA_HOST, LAMBDA_PORT);
        self.endpoint.set_local(lambda_url.as_str());

        let spec = emulator_env(ServiceSpec::image(
            cx.base().service_name(),
            "public.ecr.aws/sam/build-nodejs22.x",
            None,
        ))
        .env("SAM_CLI_TELEMETRY", "0")
        .command(format!(
            "sam local start-lambda -t {} --host 0.0.0.0 --port {}",
            template, LAMBDA_PORT
        ))
        .working_dir("/app")
        .volume(cx.volume_source(&root), "/app")
        .volume("/var/run/docker.sock", "/var/run/docker.sock")
        .port(LAMBDA_PORT, LAMBDA_PORT)
        .alias(LAMBDA_HOST)
        .health_check(
            HealthCheck::exec([
                "sam",
                "local",
                "invoke",
                LOCAL_HEALTH_FUNCTION,
                "--event",
                "{}",
                "--endpoint-url",
                lambda_url.as_str(),
            ])
            .start_period("5s"),
        );
        Ok(Some(spec))
    }
}
