//! Testing utilities for the provider.
//!
//! - [`ProviderTester`] drives a [`ProviderService`] the way a host engine
//!   would, without a host.
//! - [`ScriptedTransport`] replays a fixed sequence of HTTP outcomes and
//!   records every request, for exercising retry and error translation.
//! - [`FakeDatadogApi`] is an in-memory stand-in for the Datadog REST API,
//!   for exercising whole lifecycles, including objects deleted out of band.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_datadog::testing::{FakeDatadogApi, ProviderTester};
//! use hemmer_provider_datadog::DatadogProvider;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_create_monitor() {
//!     let api = Arc::new(FakeDatadogApi::new());
//!     let tester = ProviderTester::new(DatadogProvider::new().with_transport(api.clone()));
//!     tester.configure(json!({"api_key": "a", "app_key": "b"})).await.unwrap();
//!
//!     let state = tester
//!         .lifecycle_create("datadog_monitor", json!({
//!             "name": "m1", "type": "metric alert", "query": "avg:foo{*} > 1"
//!         }))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["name"], "m1");
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::client::{ApiRequest, ApiResponse, HttpTransport, RequestBody};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanAction, PlanResult};

/// A test harness for provider implementations.
///
/// Wraps a [`ProviderService`] and exposes the host's call sequence as
/// simple methods.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, config).await
    }

    /// Plan a change to an existing resource.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config)
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;
        if plan_result.action == PlanAction::NoOp {
            return Ok(prior_state);
        }

        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan action is not `Create`.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert_eq!(
        plan.action,
        PlanAction::Create,
        "Expected plan to create, but got {:?}",
        plan.action
    );
}

/// Assert that a plan indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan destroys and re-creates the resource.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace(),
        "Expected plan to require replacement, but got {:?}",
        plan.action
    );
}

/// Assert that a plan updates the resource in place.
///
/// # Panics
///
/// Panics if the plan action is not `Update`.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert_eq!(
        plan.action,
        PlanAction::Update,
        "Expected plan to update in place, but got {:?} (replace paths: {:?})",
        plan.action,
        plan.replace_paths
    );
}

/// Assert that a plan changes a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan leaves a specific attribute path alone.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error whose summary or detail contains
/// the given substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| {
            matches!(d.severity, DiagnosticSeverity::Error)
                && (d.summary.contains(substring)
                    || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
        });

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// Transports
// =========================================================================

/// A request as seen by a test transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: Method,
    /// Unencoded path without a leading slash, e.g. `api/v1/monitor/1`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Payload.
    pub body: Option<RequestBody>,
    /// When the request was issued.
    pub at: Instant,
}

impl RecordedRequest {
    fn capture(request: &ApiRequest) -> Self {
        Self {
            method: request.method().clone(),
            path: request.segments().join("/"),
            query: request.query_pairs().to_vec(),
            body: request.payload().cloned(),
            at: Instant::now(),
        }
    }

    /// The payload parsed as a document.
    pub fn body_value(&self) -> Result<Value, ProviderError> {
        parse_body(self.body.as_ref())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
enum Outcome {
    Respond(ApiResponse),
    Fail(String),
}

/// Replays a queue of canned outcomes, one per request.
///
/// A request arriving after the queue is exhausted fails with an internal
/// error naming the request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response.
    pub fn respond(self, status: u16, body: Value) -> Self {
        self.respond_with(ApiResponse::from_json(status, &body))
    }

    /// Queue an arbitrary response.
    pub fn respond_with(self, response: ApiResponse) -> Self {
        lock(&self.script).push_back(Outcome::Respond(response));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, message: &str) -> Self {
        lock(&self.script).push_back(Outcome::Fail(message.to_string()));
        self
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Number of outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, ProviderError> {
        lock(&self.requests).push(RecordedRequest::capture(request));
        match lock(&self.script).pop_front() {
            Some(Outcome::Respond(response)) => Ok(response),
            Some(Outcome::Fail(message)) => Err(ProviderError::Transport(message)),
            None => Err(ProviderError::Internal(format!(
                "unexpected request {} {}",
                request.method(),
                request.path()
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    objects: BTreeMap<String, Value>,
    next_id: u64,
    keyed: BTreeMap<String, String>,
    routes: BTreeMap<String, String>,
    server_fields: BTreeMap<String, Map<String, Value>>,
    overrides: Vec<(Method, String, ApiResponse)>,
    requests: Vec<RecordedRequest>,
}

/// An in-memory Datadog API.
///
/// Objects live at their full path. By default:
///
/// - `POST {collection}` stores the body at `{collection}/{id}`. Plain JSON
///   bodies get a numeric `id` field; JSON:API documents get a string
///   `data.id`.
/// - `GET`, `PUT`, `PATCH` and `DELETE` address an object by path and answer
///   `404` when it does not exist. `PATCH` of a JSON:API document merges
///   attributes; `PUT` of a plain body replaces it, keeping the ID.
/// - `GET api/v1/validate` answers `{"valid": true}`.
#[derive(Debug)]
pub struct FakeDatadogApi {
    state: Mutex<FakeState>,
}

impl Default for FakeDatadogApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDatadogApi {
    /// Create an empty API.
    pub fn new() -> Self {
        let api = Self {
            state: Mutex::new(FakeState::default()),
        };
        api.on(Method::GET, "api/v1/validate", 200, json!({"valid": true}))
    }

    /// Key a collection by a body field instead of a generated ID, e.g. Slack
    /// channels by `name`. Changing the field on update moves the object.
    pub fn keyed_by(self, collection: &str, field: &str) -> Self {
        lock(&self.state)
            .keyed
            .insert(collection.to_string(), field.to_string());
        self
    }

    /// Store objects created in `collection` under `stored_in`, for APIs that
    /// create through one path and read through another.
    pub fn route_created(self, collection: &str, stored_in: &str) -> Self {
        lock(&self.state)
            .routes
            .insert(collection.to_string(), stored_in.to_string());
        self
    }

    /// Fields the server adds to every object created in `collection`
    /// (`data.attributes` for JSON:API documents).
    pub fn with_server_fields(self, collection: &str, fields: Value) -> Self {
        if let Value::Object(fields) = fields {
            lock(&self.state)
                .server_fields
                .insert(collection.to_string(), fields);
        }
        self
    }

    /// Seed an object, e.g. an organization-wide singleton.
    pub fn with_object(self, path: &str, value: Value) -> Self {
        lock(&self.state).objects.insert(path.to_string(), value);
        self
    }

    /// Answer `method path` with a fixed response, ahead of the default
    /// routing.
    pub fn on(self, method: Method, path: &str, status: u16, body: Value) -> Self {
        lock(&self.state).overrides.push((
            method,
            path.to_string(),
            ApiResponse::from_json(status, &body),
        ));
        self
    }

    /// The object stored at `path`.
    pub fn object(&self, path: &str) -> Option<Value> {
        lock(&self.state).objects.get(path).cloned()
    }

    /// Paths of every stored object.
    pub fn paths(&self) -> Vec<String> {
        lock(&self.state).objects.keys().cloned().collect()
    }

    /// Delete an object behind the provider's back. Returns whether it
    /// existed.
    pub fn delete_out_of_band(&self, path: &str) -> bool {
        lock(&self.state).objects.remove(path).is_some()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Requests received so far with the given method.
    pub fn count(&self, method: Method) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let recorded = RecordedRequest::capture(request);
        let path = recorded.path.clone();
        let mut state = lock(&self.state);
        state.requests.push(recorded);

        if let Some((_, _, response)) = state
            .overrides
            .iter()
            .find(|(method, p, _)| method == request.method() && *p == path)
        {
            return response.clone();
        }

        let body = match parse_body(request.payload()) {
            Ok(body) => body,
            Err(err) => return error_response(400, &err.to_string()),
        };

        match *request.method() {
            Method::POST => state.create(&path, body),
            Method::GET => match state.objects.get(&path) {
                Some(object) => ApiResponse::from_json(200, object),
                None => not_found(),
            },
            Method::PUT | Method::PATCH => state.update(&path, body),
            Method::DELETE => match state.objects.remove(&path) {
                Some(_) => ApiResponse::new(204, ""),
                None => not_found(),
            },
            _ => error_response(405, "method not allowed"),
        }
    }
}

impl FakeState {
    fn create(&mut self, collection: &str, mut body: Value) -> ApiResponse {
        self.next_id += 1;
        let stored_in = self
            .routes
            .get(collection)
            .cloned()
            .unwrap_or_else(|| collection.to_string());
        let server_fields = self.server_fields.get(collection).cloned().unwrap_or_default();

        if body.get("data").is_some_and(Value::is_object) {
            let id = format!("fake-{:04}", self.next_id);
            if let Some(Value::Object(data)) = body.get_mut("data") {
                data.insert("id".to_string(), Value::String(id.clone()));
                if let Some(Value::Object(attributes)) = data.get_mut("attributes") {
                    merge_missing(attributes, &server_fields);
                }
            }
            self.objects.insert(format!("{stored_in}/{id}"), body.clone());
            return ApiResponse::from_json(201, &body);
        }

        let Value::Object(object) = &mut body else {
            return error_response(400, "expected a JSON object");
        };
        let key = match self.keyed.get(collection) {
            Some(field) => match object.get(field).and_then(Value::as_str) {
                Some(key) => key.to_string(),
                None => return error_response(400, &format!("missing `{field}`")),
            },
            None => {
                object.insert("id".to_string(), json!(self.next_id));
                self.next_id.to_string()
            },
        };
        merge_missing(object, &server_fields);
        self.objects.insert(format!("{stored_in}/{key}"), body.clone());
        ApiResponse::from_json(200, &body)
    }

    fn update(&mut self, path: &str, body: Value) -> ApiResponse {
        let Some(existing) = self.objects.get(path).cloned() else {
            return not_found();
        };

        if let (Some(Value::Object(new_data)), Some(Value::Object(_))) =
            (body.get("data"), existing.get("data"))
        {
            let mut updated = existing;
            if let Some(Value::Object(attributes)) = updated.pointer_mut("/data/attributes") {
                if let Some(Value::Object(changes)) = new_data.get("attributes") {
                    for (key, value) in changes {
                        if value.is_null() {
                            attributes.remove(key);
                        } else {
                            attributes.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            if let (Some(relationships), Some(Value::Object(data))) =
                (new_data.get("relationships"), updated.get_mut("data"))
            {
                data.insert("relationships".to_string(), relationships.clone());
            }
            self.objects.insert(path.to_string(), updated.clone());
            return ApiResponse::from_json(200, &updated);
        }

        let Value::Object(mut object) = body else {
            return error_response(400, "expected a JSON object");
        };
        if let Value::Object(old) = &existing {
            let preserved = std::iter::once("id".to_string()).chain(self.server_field_names(path));
            for key in preserved {
                if let Some(value) = old.get(&key) {
                    object.entry(key).or_insert_with(|| value.clone());
                }
            }
        }

        let (collection, key) = path.rsplit_once('/').unwrap_or(("", path));
        let new_path = match self
            .keyed
            .get(collection)
            .and_then(|field| object.get(field))
            .and_then(Value::as_str)
        {
            Some(new_key) if new_key != key => format!("{collection}/{new_key}"),
            _ => path.to_string(),
        };

        self.objects.remove(path);
        let updated = Value::Object(object);
        self.objects.insert(new_path, updated.clone());
        ApiResponse::from_json(200, &updated)
    }

    /// Server-assigned field names of the collection `path` lives in.
    fn server_field_names(&self, path: &str) -> Vec<String> {
        let collection = path.rsplit_once('/').map_or(path, |(c, _)| c);
        self.server_fields
            .iter()
            .filter(|(c, _)| self.routes.get(*c).map_or(c.as_str(), String::as_str) == collection)
            .flat_map(|(_, fields)| fields.keys().cloned())
            .collect()
    }
}

fn merge_missing(target: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn not_found() -> ApiResponse {
    error_response(404, "Not found")
}

fn error_response(status: u16, message: &str) -> ApiResponse {
    ApiResponse::from_json(status, &json!({"errors": [message]}))
}

fn parse_body(body: Option<&RequestBody>) -> Result<Value, ProviderError> {
    match body {
        None => Ok(Value::Null),
        Some(RequestBody::Json(value)) => Ok(value.clone()),
        Some(RequestBody::Text { content_type, text }) if content_type.contains("yaml") => {
            Ok(serde_yaml::from_str(text)?)
        },
        Some(RequestBody::Text { text, .. }) => Ok(serde_json::from_str(text)?),
    }
}

#[async_trait]
impl HttpTransport for FakeDatadogApi {
    async fn execute(
        &self,
        request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, ProviderError> {
        Ok(self.handle(request))
    }
}
