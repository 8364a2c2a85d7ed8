//! `api_call` strategy: templated HTTP requests driven by `callDataApi`.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::StepExecutor;
use crate::collaborators::{AuthOptions, AuthType, HttpRequestOptions, UserContext};
use crate::error::{TemplateError, TierError};
use crate::models::api_config::{CallDataApiConfig, CallDataApiSchema};
use crate::models::io_mapping::SubroutineIoMapping;
use crate::models::step::{StepConfig, StepDefinition, StepMetadata, StepResult};
use crate::template::TemplateResolver;

impl StepExecutor {
    pub(super) async fn execute_api_call(
        &self,
        step: &mut StepDefinition,
    ) -> Result<StepResult, TierError> {
        let api = step
            .routine_config
            .as_ref()
            .and_then(|c| c.call_data_api.clone())
            .ok_or_else(|| {
                TierError::Precondition("API call step requires routineConfig.callDataApi".to_string())
            })?;
        let io_mapping = step
            .io_mapping
            .as_ref()
            .ok_or_else(|| TierError::Precondition("API call step requires ioMapping".to_string()))?;

        let mut options =
            build_request_options(&api, step.config.as_ref(), io_mapping, &step.user_languages)?;
        options.auth = self
            .resolve_auth(&api.schema, step.user_id.as_deref().unwrap_or_default())
            .await?;

        tracing::info!(
            "[StepExecutor] Step {} calling {} {}",
            step.id,
            options.method,
            options.url
        );
        let response = self.http.make_request(options).await;

        if !response.success {
            return Err(TierError::Collaborator(response.error.clone().unwrap_or_else(|| {
                format!("API returned {} {}", response.status, response.status_text)
            })));
        }

        let outputs = match &api.schema.output_mapping {
            Some(mapping) => {
                let source = response.to_value();
                let mut outputs = Map::with_capacity(mapping.len());
                for (name, path) in mapping {
                    let value = resolve_path(&source, path).cloned().unwrap_or(Value::Null);
                    if let Some(io) = step.io_mapping.as_mut() {
                        io.write_output(name, value.clone());
                    }
                    outputs.insert(name.clone(), value);
                }
                Value::Object(outputs)
            }
            None => json!({
                "status": response.status,
                "statusText": response.status_text,
                "headers": response.headers,
                "body": response.data,
                "url": response.url(),
            }),
        };

        Ok(StepResult::success(outputs).with_metadata(StepMetadata {
            execution_time: response.metadata.execution_time,
            ..Default::default()
        }))
    }

    /// Auth options for the declared authentication, if any.
    ///
    /// A missing service name or a missing credential is logged and the
    /// request proceeds unauthenticated.
    async fn resolve_auth(
        &self,
        schema: &CallDataApiSchema,
        user_id: &str,
    ) -> Result<Option<AuthOptions>, TierError> {
        let Some(auth) = schema.authentication.as_ref().filter(|a| !a.is_none()) else {
            return Ok(None);
        };
        let Some(service) = auth.service() else {
            tracing::warn!(
                "[StepExecutor] Authentication '{}' declared without settings.service for {}; calling without credentials",
                auth.auth_type,
                schema.endpoint
            );
            return Ok(None);
        };

        let credential = self
            .credentials
            .get_api_key(service, &UserContext::new(user_id))
            .await?;
        let Some(credential) = credential else {
            tracing::warn!(
                "[StepExecutor] No credential for service '{}' (user '{}'); calling without credentials",
                service,
                user_id
            );
            return Ok(None);
        };

        let mut options = self.credentials.create_auth_config(&credential);
        if let Some(auth_type) = AuthType::from_str(&auth.auth_type) {
            options.auth_type = auth_type;
        }
        if let Some(header) = auth.header_name() {
            options.header_name = Some(header.to_string());
        }
        Ok(Some(options))
    }
}

/// Build the HTTP request for an API-call step in one template pass.
///
/// Timeout and retries come from the call schema, then the routine-level
/// `callDataApi`, then the step config; `None` leaves the client default.
pub fn build_request_options(
    api: &CallDataApiConfig,
    step_config: Option<&StepConfig>,
    io_mapping: &SubroutineIoMapping,
    user_languages: &[String],
) -> Result<HttpRequestOptions, TemplateError> {
    let schema = &api.schema;
    let mut resolver = TemplateResolver::new(io_mapping, user_languages);

    let url = resolver.process_to_string(&schema.endpoint)?;

    let mut headers = BTreeMap::new();
    if let Some(raw) = &schema.headers {
        for (name, value) in raw {
            let resolved = match resolver.process_value(value)? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            headers.insert(name.clone(), resolved);
        }
    }

    let body = schema
        .body
        .as_ref()
        .map(|b| resolver.process_value(b))
        .transpose()?;

    Ok(HttpRequestOptions {
        url,
        method: schema.method.to_uppercase(),
        headers,
        body,
        timeout: schema
            .timeout
            .or(api.timeout)
            .or_else(|| step_config.and_then(|c| c.timeout)),
        retries: schema
            .retries
            .or(api.retries)
            .or_else(|| step_config.and_then(|c| c.retries)),
        auth: None,
    })
}

/// Traverse a dot path with optional `[index]` segments, e.g.
/// `data.items[0].value`. Returns `None` when any segment is missing.
pub fn resolve_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, indexes) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };

        if !key.is_empty() {
            current = match current {
                Value::Object(map) => map.get(key)?,
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        let mut rest = indexes;
        while let Some(open) = rest.strip_prefix('[') {
            let close = open.find(']')?;
            let index: usize = open[..close].trim().parse().ok()?;
            current = current.as_array()?.get(index)?;
            rest = &open[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::api_config::RoutineConfig;

    fn api(v: Value) -> CallDataApiConfig {
        serde_json::from_value::<RoutineConfig>(json!({ "callDataApi": v }))
            .unwrap()
            .call_data_api
            .unwrap()
    }

    #[test]
    fn test_resolve_path_with_indexes() {
        let root = json!({ "data": { "items": [{ "value": 7 }, { "value": [1, [2, 3]] }] } });
        assert_eq!(resolve_path(&root, "data.items[0].value"), Some(&json!(7)));
        assert_eq!(resolve_path(&root, "data.items[1].value[1][0]"), Some(&json!(2)));
        assert_eq!(resolve_path(&root, "data.items.1.value[0]"), Some(&json!(1)));
        assert_eq!(resolve_path(&root, "data.items[5].value"), None);
        assert_eq!(resolve_path(&root, "data.missing.deeper"), None);
        assert_eq!(resolve_path(&root, "data.items[x]"), None);
    }

    #[test]
    fn test_build_resolves_url_headers_and_body_in_one_pass() {
        let api = api(json!({
            "schema": {
                "endpoint": "https://api.example.com/{{input.city}}?id={{nanoid(req)}}",
                "method": "post",
                "headers": { "X-Request-Id": "{{nanoid(req)}}", "X-Langs": "{{userLanguages}}" },
                "body": { "city": "{{input.city}}", "limit": 5, "langs": "{{userLanguages}}" }
            }
        }));
        let io = SubroutineIoMapping::new().with_input("city", json!("NYC"));
        let langs = vec!["fr".to_string(), "en".to_string()];

        let options = build_request_options(&api, None, &io, &langs).unwrap();
        let id = options.headers["X-Request-Id"].clone();
        assert_eq!(id.len(), 21);
        assert_eq!(options.url, format!("https://api.example.com/NYC?id={}", id));
        assert_eq!(options.method, "POST");
        assert_eq!(options.headers["X-Langs"], r#"["fr","en"]"#);
        assert_eq!(
            options.body,
            Some(json!({ "city": "NYC", "limit": 5, "langs": ["fr", "en"] }))
        );
    }

    #[test]
    fn test_timeout_and_retries_priority() {
        let step_config = StepConfig {
            timeout: Some(3),
            retries: Some(3),
            ..Default::default()
        };
        let io = SubroutineIoMapping::new();

        let call_level = api(json!({
            "schema": { "endpoint": "https://x", "timeout": 1, "retries": 1 },
            "timeout": 2, "retries": 2
        }));
        let o = build_request_options(&call_level, Some(&step_config), &io, &[]).unwrap();
        assert_eq!((o.timeout, o.retries), (Some(1), Some(1)));

        let routine_level = api(json!({ "schema": { "endpoint": "https://x" }, "timeout": 2 }));
        let o = build_request_options(&routine_level, Some(&step_config), &io, &[]).unwrap();
        assert_eq!((o.timeout, o.retries), (Some(2), Some(3)));

        let bare = api(json!({ "schema": { "endpoint": "https://x" } }));
        let o = build_request_options(&bare, None, &io, &[]).unwrap();
        assert_eq!((o.timeout, o.retries), (None, None));
    }

    #[test]
    fn test_missing_input_aborts_build() {
        let api = api(json!({ "schema": { "endpoint": "https://x/{{input.city}}" } }));
        let err = build_request_options(&api, None, &SubroutineIoMapping::new(), &[]).unwrap_err();
        assert_eq!(err, TemplateError::InputNotFound("city".to_string()));
    }
}
