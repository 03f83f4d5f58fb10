//! Normalization of raw instance payloads into [`Snapshot`]s.
//!
//! The provider reports `ports` either as a Docker-style object
//! (`{"22/tcp": [{"HostIp": "0.0.0.0", "HostPort": "40022"}]}`) or as a bare
//! list of port numbers. Only the object form is a port mapping; everything
//! else normalizes to `None` so the differ never sees raw JSON.

use serde_json::{Map, Value as JsonValue};

use crate::error::FetchError;

use super::record::{HostBinding, PortMapping, ResourceId, Snapshot};

impl Snapshot {
    /// Build a snapshot from an instance payload.
    ///
    /// Accepts the payload bare or wrapped in an `{"instances": {...}}`
    /// envelope, as returned by the show-instance endpoint.
    pub fn from_instance_json(resource_id: ResourceId, payload: &JsonValue) -> Result<Self, FetchError> {
        let body = match payload.get("instances") {
            Some(inner @ JsonValue::Object(_)) => inner,
            Some(JsonValue::Null) => {
                return Err(FetchError::NotFound { resource_id });
            }
            Some(other) => {
                return Err(FetchError::decode(format!(
                    "instance {resource_id}: expected object under 'instances', got {}",
                    json_type(other)
                )));
            }
            None => payload,
        };

        let JsonValue::Object(fields) = body else {
            return Err(FetchError::decode(format!(
                "instance {resource_id}: expected object payload, got {}",
                json_type(body)
            )));
        };

        // An unusable port only means "not reachable yet"; state still diffs.
        let port = match fields.get("ssh_port") {
            None | Some(JsonValue::Null) => 0,
            Some(v) => as_port(v).unwrap_or_else(|| {
                tracing::debug!(resource_id = %resource_id, ssh_port = %v, "ignoring unusable ssh_port");
                0
            }),
        };

        Ok(Self {
            resource_id,
            state: string_field(fields, "cur_state"),
            status: string_field(fields, "actual_status"),
            host: string_field(fields, "ssh_host"),
            port,
            port_mapping: fields.get("ports").and_then(port_mapping),
            public_address: Some(string_field(fields, "public_ipaddr")).filter(|s| !s.trim().is_empty()),
        })
    }
}

fn string_field(fields: &Map<String, JsonValue>, key: &str) -> String {
    match fields.get(key) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
fn as_port(value: &JsonValue) -> Option<u16> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(f))
                    .map(|f| f as u64)
            })
            .and_then(|v| u16::try_from(v).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn port_mapping(value: &JsonValue) -> Option<PortMapping> {
    let JsonValue::Object(entries) = value else {
        return None;
    };

    let mut mapping = PortMapping::new();
    for (container_port, bindings) in entries {
        let bindings = match bindings {
            JsonValue::Array(items) => items.iter().filter_map(host_binding).collect(),
            _ => Vec::new(),
        };
        mapping.insert(container_port.clone(), bindings);
    }
    Some(mapping)
}

fn host_binding(value: &JsonValue) -> Option<HostBinding> {
    let host_port = as_port(value.get("HostPort")?)?;
    let host_ip = value
        .get("HostIp")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    Some(HostBinding::new(host_ip, host_port))
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ID: ResourceId = ResourceId::new(7);

    #[test]
    fn parses_enveloped_running_instance() {
        let payload = json!({
            "instances": {
                "cur_state": "running",
                "actual_status": "running",
                "ssh_host": "ssh5.vast.ai",
                "ssh_port": 31022,
                "public_ipaddr": "203.0.113.9",
                "ports": {
                    "22/tcp": [{"HostIp": "0.0.0.0", "HostPort": "40022"}],
                    "8080/tcp": [{"HostIp": "0.0.0.0", "HostPort": 40080}]
                }
            }
        });

        let snap = Snapshot::from_instance_json(ID, &payload).unwrap();
        assert_eq!(snap.state, "running");
        assert_eq!(snap.status, "running");
        assert_eq!(snap.host, "ssh5.vast.ai");
        assert_eq!(snap.port, 31022);
        assert_eq!(snap.public_address.as_deref(), Some("203.0.113.9"));
        assert!(snap.is_connectivity_ready());
        assert!(snap.is_port_mapped());

        let mapping = snap.port_mapping.unwrap();
        assert_eq!(mapping.external_port(22), Some(40022));
        assert_eq!(mapping.external_port(8080), Some(40080));
    }

    #[test]
    fn nulls_become_empty_fields() {
        let payload = json!({
            "cur_state": null,
            "actual_status": "loading",
            "ssh_host": null,
            "ssh_port": null,
            "public_ipaddr": "",
            "ports": null
        });

        let snap = Snapshot::from_instance_json(ID, &payload).unwrap();
        assert_eq!(snap.state, "");
        assert_eq!(snap.status, "loading");
        assert_eq!(snap.port, 0);
        assert!(snap.public_address.is_none());
        assert!(snap.port_mapping.is_none());
        assert!(!snap.is_connectivity_ready());
    }

    #[test]
    fn port_list_is_not_a_mapping() {
        let payload = json!({"cur_state": "running", "ports": [22, 8080]});
        let snap = Snapshot::from_instance_json(ID, &payload).unwrap();
        assert!(snap.port_mapping.is_none());
        assert!(!snap.is_port_mapped());
    }

    #[test]
    fn empty_port_object_is_present_but_not_mapped() {
        let payload = json!({"ports": {}});
        let snap = Snapshot::from_instance_json(ID, &payload).unwrap();
        assert_eq!(snap.port_mapping, Some(PortMapping::new()));
        assert!(!snap.is_port_mapped());
    }

    #[test]
    fn malformed_bindings_are_dropped() {
        let payload = json!({
            "ports": {
                "22/tcp": [{"HostIp": "0.0.0.0"}, {"HostPort": "not-a-port"}, {"HostPort": "40022"}],
                "53/udp": "garbage"
            }
        });
        let mapping = Snapshot::from_instance_json(ID, &payload).unwrap().port_mapping.unwrap();
        assert_eq!(mapping.get("22/tcp").unwrap(), &[HostBinding::new("", 40022)]);
        assert!(mapping.get("53/udp").unwrap().is_empty());
    }

    #[test]
    fn null_envelope_is_not_found() {
        let err = Snapshot::from_instance_json(ID, &json!({"instances": null})).unwrap_err();
        assert_eq!(err, FetchError::NotFound { resource_id: ID });
    }

    #[test]
    fn non_object_payload_is_decode_error() {
        let err = Snapshot::from_instance_json(ID, &json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));

        let err = Snapshot::from_instance_json(ID, &json!({"instances": [1]})).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn unusable_ssh_port_normalizes_to_zero_and_keeps_state() {
        for bad in [json!(-1), json!(""), json!(70000), json!(22.5), json!("ssh"), json!(true)] {
            let payload = json!({
                "cur_state": "running",
                "actual_status": "running",
                "ssh_host": "ssh5.vast.ai",
                "ssh_port": bad.clone(),
            });
            let snap = Snapshot::from_instance_json(ID, &payload).unwrap();
            assert_eq!(snap.port, 0, "ssh_port {bad}");
            assert_eq!(snap.state, "running");
            assert_eq!(snap.status, "running");
            assert_eq!(snap.host, "ssh5.vast.ai");
            assert!(!snap.is_connectivity_ready());
        }
    }

    #[test]
    fn integral_float_ssh_port_is_accepted() {
        let snap = Snapshot::from_instance_json(ID, &json!({"ssh_host": "h", "ssh_port": 22.0})).unwrap();
        assert_eq!(snap.port, 22);
        assert!(snap.is_connectivity_ready());
    }

    #[test]
    fn ssh_port_as_string_is_accepted() {
        let snap = Snapshot::from_instance_json(ID, &json!({"ssh_host": "h", "ssh_port": "22"})).unwrap();
        assert_eq!(snap.port, 22);
    }
}
