//! Reconciler for a single desired state.
//!
//! Each invocation resolves the remote resource, picks one transition
//! (create, update, delete or no-op) and applies it. Mutations are never
//! trusted: the after-state is always fetched again, including after a
//! partially applied update.

use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiTransport, HttpMethod};
use crate::error::{ApiError, CloudscaleError, ReconcileError, Result};
use crate::planner::{ChangeSet, DiffEngine, Step, Transition};
use crate::resolver::Resolver;
use crate::resources::{
    DesiredState, Kind, KindSchema, Registry, RemoteResource, ResourceHandler, ResourceSpec,
};

/// Default time a new resource may take to become readable.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 30;

/// Default time a resource may take to reach a lifecycle status.
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 300;

/// Tunables of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Compute transitions without issuing mutating calls.
    pub dry_run: bool,
    /// How long to poll for a newly created resource.
    pub visibility_timeout: Duration,
    /// How long to poll for a lifecycle status.
    pub status_timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECS),
            status_timeout: Duration::from_secs(DEFAULT_STATUS_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Stable error class.
    pub class: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl From<&CloudscaleError> for Failure {
    fn from(err: &CloudscaleError) -> Self {
        Self {
            class: err.class(),
            message: err.to_string(),
        }
    }
}

/// Outcome of reconciling one desired state.
#[derive(Debug, Clone)]
pub struct ReconciliationResult {
    /// Resource kind.
    pub kind: Kind,
    /// Transition taken (or that would be taken in dry-run mode).
    pub transition: Transition,
    /// Whether remote state changed (or would change).
    pub changed: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Identifying fields of the desired state.
    pub identity: Map<String, Value>,
    /// Remote state before the invocation.
    pub before: Option<RemoteResource>,
    /// Remote state after the invocation; projected in dry-run mode.
    pub after: Option<RemoteResource>,
    /// Field changes of an update.
    pub changes: ChangeSet,
    /// Set when the invocation failed.
    pub error: Option<Failure>,
}

impl ReconciliationResult {
    fn new(kind: Kind, dry_run: bool) -> Self {
        Self {
            kind,
            transition: Transition::Noop,
            changed: false,
            dry_run,
            identity: Map::new(),
            before: None,
            after: None,
            changes: ChangeSet::default(),
            error: None,
        }
    }

    /// Returns true if the invocation failed.
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Drives one desired state to convergence.
pub struct Reconciler<'a, T: ApiTransport + ?Sized> {
    /// API transport.
    api: &'a T,
    /// Kind registry.
    registry: &'a Registry,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Options.
    options: ReconcileOptions,
}

impl<'a, T: ApiTransport + ?Sized> Reconciler<'a, T> {
    /// Creates a new reconciler with default options.
    #[must_use]
    pub fn new(api: &'a T, registry: &'a Registry) -> Self {
        Self {
            api,
            registry,
            diff_engine: DiffEngine::new(),
            options: ReconcileOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub const fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconciles one desired state.
    ///
    /// Failures are recorded in the result rather than returned, together
    /// with whatever was observed before the failure.
    pub async fn reconcile(&self, spec: &ResourceSpec) -> ReconciliationResult {
        let mut result = ReconciliationResult::new(spec.kind(), self.options.dry_run);

        if let Err(err) = self.run(spec, &mut result).await {
            warn!("Reconciling {} failed: {}", spec.kind(), err);
            result.error = Some(Failure::from(&err));
        }
        result
    }

    async fn run(&self, spec: &ResourceSpec, result: &mut ReconciliationResult) -> Result<()> {
        let mut desired = spec.desired_state()?;
        result.identity = identity(&desired);

        let handler = self.registry.handler(desired.kind)?;
        let resolver = Resolver::new(self.api, self.registry);

        resolver
            .resolve_references(&mut desired, self.options.dry_run)
            .await?;
        let before = resolver.resolve(&desired).await?;
        result.before.clone_from(&before);

        match (before, desired.ensure.is_absent()) {
            (None, true) => {
                debug!("{} is already absent", desired.describe());
                Ok(())
            }
            (Some(remote), true) => self.delete(handler, &desired, &remote, result).await,
            (None, false) => self.create(handler, &desired, result).await,
            (Some(remote), false) => self.update(handler, &desired, remote, result).await,
        }
    }

    async fn create(
        &self,
        handler: &dyn ResourceHandler,
        desired: &DesiredState,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        let schema = handler.schema();
        result.transition = Transition::Create;
        let body = handler.create_body(desired)?;

        if self.options.dry_run {
            info!("Would create {}", desired.describe());
            result.changed = true;
            result.after = Some(handler.project(desired, None));
            return Ok(());
        }

        info!("Creating {}", desired.describe());
        let response = self
            .api
            .request(HttpMethod::Post, schema.path, Some(body))
            .await?;
        result.changed = true;

        let created = handler.remote(response)?;
        let id = created
            .id()
            .map(String::from)
            .ok_or_else(|| ReconcileError::MissingIdentifier {
                kind: schema.kind.to_string(),
                key: schema.id_key.to_string(),
            })?;

        match self.settle(handler, desired, &id).await {
            Ok(current) => {
                info!("Created {} {}", schema.kind, id);
                result.after = Some(keep_secrets(schema, &created, current));
                Ok(())
            }
            Err(err) => {
                warn!("{} {} was created but did not settle: {}", schema.kind, id, err);
                result.after = self
                    .reread(handler, &id)
                    .await
                    .map(|current| keep_secrets(schema, &created, current));
                Err(err)
            }
        }
    }

    /// Brings a new resource to its desired state once it exists.
    async fn settle(
        &self,
        handler: &dyn ResourceHandler,
        desired: &DesiredState,
        id: &str,
    ) -> Result<RemoteResource> {
        let mut current = self.await_visible(handler, id).await?;
        if let Some(status) = handler.settled_status(desired) {
            current = self.wait_for_status(handler, id, status).await?;
        }

        // Fields only reachable through actions, such as a server created stopped.
        let changes = handler.adjust_changes(desired, &current, self.diff_engine.diff(desired, &current));
        if !changes.is_empty() {
            debug!("Applying {} follow-up change(s) to {}", changes.len(), desired.describe());
            for step in handler.update_steps(desired, &current, &changes)? {
                self.execute(handler, id, &step).await?;
            }
            current = self.refetch(handler, id).await?;
        }
        Ok(current)
    }

    async fn update(
        &self,
        handler: &dyn ResourceHandler,
        desired: &DesiredState,
        remote: RemoteResource,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        for field in self.diff_engine.create_only_drift(desired, &remote) {
            warn!(
                "{} differs in '{}', which can only be set on creation",
                desired.describe(),
                field
            );
        }

        let changes = handler.adjust_changes(desired, &remote, self.diff_engine.diff(desired, &remote));
        if changes.is_empty() {
            debug!("{} is up to date", desired.describe());
            result.after = Some(remote);
            return Ok(());
        }

        let steps = handler.update_steps(desired, &remote, &changes)?;
        if steps.is_empty() {
            debug!("{} needs no calls to apply its changes", desired.describe());
            result.after = Some(remote);
            return Ok(());
        }

        result.transition = Transition::Update;
        result.changes = changes.clone();

        if self.options.dry_run {
            info!("Would update {} ({} change(s))", desired.describe(), changes.len());
            let mut projected = remote;
            for change in &changes {
                projected.set(change.field, change.new.clone());
            }
            result.changed = true;
            result.after = Some(projected);
            return Ok(());
        }

        let schema = handler.schema();
        let id = remote
            .id()
            .ok_or_else(|| ReconcileError::MissingIdentifier {
                kind: schema.kind.to_string(),
                key: schema.id_key.to_string(),
            })?
            .to_string();

        info!("Updating {} ({} change(s))", desired.describe(), changes.len());
        let mut executed = 0_usize;
        let mut outcome = Ok(());
        for step in &steps {
            if let Err(err) = self.execute(handler, &id, step).await {
                outcome = Err(err);
                break;
            }
            if matches!(step, Step::Call(_)) {
                executed += 1;
            }
        }
        result.changed = executed > 0;

        match outcome {
            Ok(()) => {
                result.after = Some(self.refetch(handler, &id).await?);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Update of {} stopped after {} of {} step(s)",
                    desired.describe(),
                    executed,
                    steps.len()
                );
                result.after = self.reread(handler, &id).await;
                Err(err)
            }
        }
    }

    async fn delete(
        &self,
        handler: &dyn ResourceHandler,
        desired: &DesiredState,
        remote: &RemoteResource,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        let schema = handler.schema();
        result.transition = Transition::Delete;
        let id = remote.id().ok_or_else(|| ReconcileError::MissingIdentifier {
            kind: schema.kind.to_string(),
            key: schema.id_key.to_string(),
        })?;

        if self.options.dry_run {
            info!("Would delete {}", desired.describe());
            result.changed = true;
            return Ok(());
        }

        info!("Deleting {} {}", schema.kind, id);
        match self
            .api
            .request(HttpMethod::Delete, &schema.item_path(id), None)
            .await
        {
            Ok(_) => result.changed = true,
            Err(err) if err.is_not_found() => {
                debug!("{} {} disappeared before deletion", schema.kind, id);
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    async fn execute(&self, handler: &dyn ResourceHandler, id: &str, step: &Step) -> Result<()> {
        debug!("Step: {}", step);
        match step {
            Step::Call(mutation) => {
                self.api
                    .request(mutation.method, &mutation.path, mutation.body.clone())
                    .await?;
            }
            Step::AwaitStatus(status) => {
                self.wait_for_status(handler, id, status).await?;
            }
        }
        Ok(())
    }

    /// Reads a resource after a failure; a read error only leaves it unknown.
    async fn reread(&self, handler: &dyn ResourceHandler, id: &str) -> Option<RemoteResource> {
        Resolver::new(self.api, self.registry)
            .fetch(handler, id)
            .await
            .unwrap_or_else(|err| {
                warn!("Could not re-read {} {}: {}", handler.schema().kind, id, err);
                None
            })
    }

    async fn refetch(&self, handler: &dyn ResourceHandler, id: &str) -> Result<RemoteResource> {
        Resolver::new(self.api, self.registry)
            .fetch(handler, id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound {
                    path: handler.schema().item_path(id),
                }
                .into()
            })
    }

    /// Polls until a newly created resource can be read.
    async fn await_visible(&self, handler: &dyn ResourceHandler, id: &str) -> Result<RemoteResource> {
        let resolver = Resolver::new(self.api, self.registry);
        let start = Instant::now();

        loop {
            if let Some(found) = resolver.fetch(handler, id).await? {
                return Ok(found);
            }
            if start.elapsed() > self.options.visibility_timeout {
                return Err(ApiError::Timeout {
                    resource: format!("{} {}", handler.schema().kind, id),
                    expected: String::from("visibility"),
                }
                .into());
            }
            debug!("{} {} not visible yet", handler.schema().kind, id);
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// Polls until a resource reports a lifecycle status.
    async fn wait_for_status(
        &self,
        handler: &dyn ResourceHandler,
        id: &str,
        status: &str,
    ) -> Result<RemoteResource> {
        let resolver = Resolver::new(self.api, self.registry);
        let start = Instant::now();

        loop {
            if let Some(current) = resolver.fetch(handler, id).await?
                && current.status() == Some(status)
            {
                return Ok(current);
            }
            if start.elapsed() > self.options.status_timeout {
                return Err(ApiError::Timeout {
                    resource: format!("{} {}", handler.schema().kind, id),
                    expected: format!("status '{status}'"),
                }
                .into());
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

/// Copies generated secrets, only ever returned by the creation response.
fn keep_secrets(
    schema: &KindSchema,
    created: &RemoteResource,
    mut current: RemoteResource,
) -> RemoteResource {
    for key in schema.secret_fields {
        if let Some(secret) = created.get(key) {
            current.set(key, secret.clone());
        }
    }
    current
}

/// Identifying fields of a desired state, reported for absent resources.
fn identity(desired: &DesiredState) -> Map<String, Value> {
    let schema = desired.schema();
    let mut identity = Map::new();
    if let Some(id) = &desired.id {
        identity.insert(schema.id_key.to_string(), Value::String(id.clone()));
    }
    if let (Some(key), Some(name)) = (schema.name_key, desired.lookup_name()) {
        identity.insert(key.to_string(), Value::String(name.to_string()));
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeCloud;
    use crate::api::MockApiTransport;
    use serde_json::json;

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            poll_interval: Duration::from_millis(1),
            visibility_timeout: Duration::from_millis(200),
            status_timeout: Duration::from_millis(200),
            ..ReconcileOptions::default()
        }
    }

    fn spec(registry: &Registry, entry: Value) -> ResourceSpec {
        registry.parse(entry).expect("valid entry")
    }

    #[tokio::test]
    async fn test_create_server() {
        let cloud = FakeCloud::new();
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let server = spec(
            &registry,
            json!({"kind": "server", "name": "web1", "flavor": "flex-2", "image": "debian-12"}),
        );
        let result = reconciler.reconcile(&server).await;

        assert!(!result.failed(), "{:?}", result.error);
        assert!(result.changed);
        assert_eq!(result.transition, Transition::Create);
        let after = result.after.expect("after");
        assert_eq!(after.get_str("name"), Some("web1"));
        assert_eq!(after.get_str("flavor"), Some("flex-2"));

        let creates: Vec<_> = cloud
            .mutations()
            .into_iter()
            .filter(|(method, path)| *method == HttpMethod::Post && path == "servers")
            .collect();
        assert_eq!(creates.len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let cloud = FakeCloud::new();
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let volume = spec(
            &registry,
            json!({"kind": "volume", "name": "data", "size_gb": 50, "zone": "lpg1", "tags": {"env": "prod"}}),
        );

        let first = reconciler.reconcile(&volume).await;
        assert!(first.changed);
        let second = reconciler.reconcile(&volume).await;
        assert!(!second.failed(), "{:?}", second.error);
        assert!(!second.changed);
        assert_eq!(second.transition, Transition::Noop);
        assert_eq!(second.before, second.after);
        assert_eq!(cloud.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_flavor_change_scales_by_id() {
        let cloud = FakeCloud::new();
        cloud.insert(
            "servers",
            json!({"uuid": "abc", "name": "web1", "flavor": {"slug": "flex-2"}, "status": "stopped"}),
        );
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let server = spec(&registry, json!({"kind": "server", "name": "web1", "flavor": "flex-4"}));
        let result = reconciler.reconcile(&server).await;

        assert!(!result.failed(), "{:?}", result.error);
        assert!(result.changed);
        assert_eq!(result.transition, Transition::Update);
        let change = result.changes.get("flavor").expect("flavor change");
        assert_eq!(change.old, json!("flex-2"));
        assert_eq!(change.new, json!("flex-4"));

        assert_eq!(
            cloud.mutations(),
            vec![(HttpMethod::Post, String::from("servers/abc/scale"))]
        );
        let after = result.after.expect("after");
        assert_eq!(after.get_str("flavor"), Some("flex-4"));
    }

    #[tokio::test]
    async fn test_delete_present_resource() {
        let cloud = FakeCloud::new();
        cloud.insert("networks", json!({"uuid": "n1", "name": "private"}));
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let network = spec(&registry, json!({"kind": "network", "name": "private", "state": "absent"}));
        let result = reconciler.reconcile(&network).await;

        assert!(result.changed);
        assert_eq!(result.transition, Transition::Delete);
        assert!(result.after.is_none());
        assert_eq!(
            cloud.mutations(),
            vec![(HttpMethod::Delete, String::from("networks/n1"))]
        );

        let again = reconciler.reconcile(&network).await;
        assert!(!again.changed);
        assert_eq!(again.transition, Transition::Noop);
        assert_eq!(again.identity.get("name"), Some(&json!("private")));
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_mutations() {
        let mut api = MockApiTransport::new();
        api.expect_request()
            .withf(|method, _, _| !method.is_mutating())
            .returning(|_, path, _| match path {
                "volumes" => Ok(json!([
                    {"uuid": "v1", "name": "data", "size_gb": 50, "tags": {}},
                    {"uuid": "v2", "name": "old", "size_gb": 10, "tags": {}},
                ])),
                _ => Ok(json!([])),
            });
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&api, &registry)
            .with_options(options())
            .with_dry_run(true);

        let resize = spec(&registry, json!({"kind": "volume", "name": "data", "size_gb": 100}));
        let result = reconciler.reconcile(&resize).await;
        assert!(!result.failed(), "{:?}", result.error);
        assert!(result.changed);
        assert!(result.dry_run);
        assert_eq!(result.transition, Transition::Update);
        assert_eq!(result.after.expect("projected").get("size_gb"), Some(&json!(100)));

        let create = spec(&registry, json!({"kind": "volume", "name": "logs", "size_gb": 20}));
        let result = reconciler.reconcile(&create).await;
        assert!(result.changed);
        assert_eq!(result.transition, Transition::Create);
        assert_eq!(result.after.expect("projected").get_str("name"), Some("logs"));

        let delete = spec(&registry, json!({"kind": "volume", "name": "old", "state": "absent"}));
        let result = reconciler.reconcile(&delete).await;
        assert!(result.changed);
        assert_eq!(result.transition, Transition::Delete);
    }

    #[tokio::test]
    async fn test_waits_for_new_resource_to_appear() {
        let cloud = FakeCloud::new();
        cloud.hide_new_resources(2);
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let group = spec(&registry, json!({"kind": "server_group", "name": "web"}));
        let result = reconciler.reconcile(&group).await;

        assert!(!result.failed(), "{:?}", result.error);
        assert_eq!(
            result.after.expect("after").get_str("type"),
            Some("anti-affinity")
        );
    }

    #[tokio::test]
    async fn test_visibility_timeout() {
        let cloud = FakeCloud::new();
        cloud.hide_new_resources(u32::MAX);
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(ReconcileOptions {
            visibility_timeout: Duration::from_millis(10),
            ..options()
        });

        let group = spec(&registry, json!({"kind": "server_group", "name": "web"}));
        let result = reconciler.reconcile(&group).await;

        assert!(result.changed);
        assert_eq!(result.error.expect("failure").class, "timeout");
    }

    #[tokio::test]
    async fn test_partial_update_reports_remote_state() {
        let cloud = FakeCloud::new();
        cloud.insert(
            "servers",
            json!({"uuid": "abc", "name": "web1", "flavor": {"slug": "flex-2"}, "status": "running", "tags": {}}),
        );
        cloud.fail_next(HttpMethod::Post, "servers/abc/stop");
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let server = spec(
            &registry,
            json!({"kind": "server", "name": "web1", "tags": {"role": "web"}, "state": "stopped"}),
        );
        let result = reconciler.reconcile(&server).await;

        assert!(result.failed());
        assert!(result.changed);
        let after = result.after.expect("re-read after failure");
        assert_eq!(after.get("tags"), Some(&json!({"role": "web"})));
        assert_eq!(after.status(), Some("running"));
    }

    #[tokio::test]
    async fn test_missing_create_field_fails_without_mutation() {
        let mut api = MockApiTransport::new();
        api.expect_request()
            .withf(|method, _, _| !method.is_mutating())
            .returning(|_, _, _| Ok(json!([])));
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&api, &registry).with_options(options());

        let server = spec(&registry, json!({"kind": "server", "name": "web1"}));
        let result = reconciler.reconcile(&server).await;

        assert!(!result.changed);
        assert_eq!(result.transition, Transition::Create);
        assert_eq!(result.error.expect("failure").class, "reconcile");
    }

    #[tokio::test]
    async fn test_ambiguous_names_fail() {
        let cloud = FakeCloud::new();
        cloud.insert("networks", json!({"uuid": "n1", "name": "private"}));
        cloud.insert("networks", json!({"uuid": "n2", "name": "private"}));
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let network = spec(&registry, json!({"kind": "network", "name": "private", "mtu": 9000}));
        let result = reconciler.reconcile(&network).await;

        assert!(result.failed());
        assert!(!result.changed);
        assert!(cloud.mutations().is_empty());
        assert_eq!(result.error.expect("failure").class, "ambiguous_match");
    }

    #[tokio::test]
    async fn test_generated_secrets_kept_from_creation() {
        let cloud = FakeCloud::new();
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let user = spec(&registry, json!({"kind": "objects_user", "display_name": "backup"}));
        let result = reconciler.reconcile(&user).await;

        assert!(!result.failed(), "{:?}", result.error);
        let after = result.after.expect("after");
        assert_eq!(after.id(), Some("user1"));
        assert!(after.get("keys").is_some());
    }

    #[tokio::test]
    async fn test_failed_follow_up_after_create_reports_created_server() {
        let cloud = FakeCloud::new();
        cloud.fail_next(HttpMethod::Post, "servers/00000000-0000-4000-8000-000000000001/stop");
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let server = spec(
            &registry,
            json!({"kind": "server", "name": "web1", "flavor": "flex-2", "image": "debian-12", "state": "stopped"}),
        );
        let result = reconciler.reconcile(&server).await;

        assert!(result.failed());
        assert!(result.changed);
        assert_eq!(result.transition, Transition::Create);
        assert_eq!(cloud.items("servers").len(), 1);

        let after = result.after.clone().expect("created server is reported");
        assert_eq!(after.id(), Some("00000000-0000-4000-8000-000000000001"));
        assert_eq!(after.status(), Some("running"));

        let envelope = crate::report::ResultReporter::new().report(&result);
        assert_eq!(envelope["server"]["state"], json!("running"));
    }

    #[tokio::test]
    async fn test_unsettled_server_fails_the_same_way_in_dry_run() {
        let registry = Registry::builtin();
        let server = spec(&registry, json!({"kind": "server", "name": "web1", "state": "stopped"}));
        let seeded = json!({"uuid": "abc", "name": "web1", "status": "changing"});

        let dry_cloud = FakeCloud::new();
        dry_cloud.insert("servers", seeded.clone());
        let dry = Reconciler::new(&dry_cloud, &registry)
            .with_options(options())
            .with_dry_run(true)
            .reconcile(&server)
            .await;

        let cloud = FakeCloud::new();
        cloud.insert("servers", seeded);
        let real = Reconciler::new(&cloud, &registry)
            .with_options(options())
            .reconcile(&server)
            .await;

        assert_eq!(dry.changed, real.changed);
        assert!(!real.changed);
        assert!(cloud.mutations().is_empty());
        let error = real.error.expect("failure");
        assert_eq!(error.class, "reconcile");
        assert!(error.message.contains("changing"));
        assert_eq!(dry.error.map(|e| e.class), Some("reconcile"));
    }

    #[tokio::test]
    async fn test_delete_of_vanished_resource_is_unchanged() {
        let mut api = MockApiTransport::new();
        api.expect_request()
            .withf(|method, path, _| *method == HttpMethod::Get && path == "networks")
            .returning(|_, _, _| Ok(json!([{"uuid": "n1", "name": "private"}])));
        api.expect_request()
            .withf(|method, path, _| *method == HttpMethod::Delete && path == "networks/n1")
            .times(1)
            .returning(|_, path, _| {
                Err(ApiError::NotFound {
                    path: path.to_string(),
                }
                .into())
            });
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&api, &registry).with_options(options());

        let network = spec(&registry, json!({"kind": "network", "name": "private", "state": "absent"}));
        let result = reconciler.reconcile(&network).await;

        assert!(!result.failed(), "{:?}", result.error);
        assert!(!result.changed);
        assert_eq!(result.transition, Transition::Delete);
        assert!(result.after.is_none());
    }

    #[tokio::test]
    async fn test_floating_ip_is_read_by_address_and_patched() {
        let cloud = FakeCloud::new();
        cloud.insert(
            "servers",
            json!({"uuid": "00000000-0000-4000-8000-0000000000aa", "name": "web2", "status": "running"}),
        );
        cloud.insert(
            "floating-ips",
            json!({
                "network": "192.0.2.10/32",
                "server": {"uuid": "00000000-0000-4000-8000-0000000000bb"},
                "reverse_ptr": "old.example.com",
                "tags": {},
            }),
        );
        let registry = Registry::builtin();
        let reconciler = Reconciler::new(&cloud, &registry).with_options(options());

        let floating_ip = spec(
            &registry,
            json!({
                "kind": "floating_ip",
                "ip": "192.0.2.10",
                "server": "web2",
                "reverse_ptr": "new.example.com",
                "tags": {"role": "lb"},
            }),
        );
        let result = reconciler.reconcile(&floating_ip).await;

        assert!(!result.failed(), "{:?}", result.error);
        assert!(result.changed);
        assert_eq!(result.transition, Transition::Update);
        let fields: Vec<&str> = result.changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["server", "reverse_ptr", "tags"]);

        let calls = cloud.calls();
        assert!(calls.contains(&(HttpMethod::Get, String::from("floating-ips/192.0.2.10"))));
        assert!(!calls.contains(&(HttpMethod::Get, String::from("floating-ips"))));
        assert_eq!(
            cloud.mutations(),
            vec![(HttpMethod::Patch, String::from("floating-ips/192.0.2.10"))]
        );

        let after = result.after.expect("after");
        assert_eq!(after.get_str("ip"), Some("192.0.2.10"));
        assert_eq!(after.get_str("server"), Some("00000000-0000-4000-8000-0000000000aa"));
        assert_eq!(after.get_str("reverse_ptr"), Some("new.example.com"));
        assert_eq!(after.get("tags"), Some(&json!({"role": "lb"})));

        let again = reconciler.reconcile(&floating_ip).await;
        assert!(!again.changed, "{:?}", again.changes);
        assert_eq!(cloud.mutations().len(), 1);
    }
}
