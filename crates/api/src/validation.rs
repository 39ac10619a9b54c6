use courier_domain::entities::JobType;

use crate::error::ApiError;

/// The job type must come from the closed set.
pub fn parse_job_type(value: Option<&serde_json::Value>) -> Result<JobType, ApiError> {
    let Some(raw) = value.and_then(|v| v.as_str()) else {
        return Err(ApiError::bad_request("Job type is required"));
    };
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid job type: {raw}")))
}

/// The payload must be a non-empty JSON object; the core never looks
/// inside it.
pub fn validate_payload(value: Option<&serde_json::Value>) -> Result<serde_json::Value, ApiError> {
    match value {
        Some(serde_json::Value::Object(map)) if !map.is_empty() => {
            Ok(serde_json::Value::Object(map.clone()))
        }
        _ => Err(ApiError::bad_request("Payload must be a non-empty object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_accepts_non_empty_object() {
        let value = json!({"to": "+1"});
        assert_eq!(validate_payload(Some(&value)).unwrap(), value);
    }

    #[test]
    fn payload_rejects_arrays_scalars_and_empty_objects() {
        for bad in [json!([]), json!("text"), json!(42), json!({}), json!(null)] {
            let err = validate_payload(Some(&bad)).unwrap_err();
            assert_eq!(err.to_string(), "Payload must be a non-empty object");
        }
        assert!(validate_payload(None).is_err());
    }

    #[test]
    fn job_type_parses_closed_set() {
        let value = json!("cronjob");
        assert_eq!(parse_job_type(Some(&value)).unwrap(), JobType::Cronjob);

        let err = parse_job_type(Some(&json!("fax"))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid job type: fax");

        let err = parse_job_type(None).unwrap_err();
        assert_eq!(err.to_string(), "Job type is required");
    }
}
