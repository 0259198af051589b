//! Purpose: Shared JSON serializers for pool status output.
//! Exports: `status_json`.
//! Role: Keep the status envelope shape consistent across commands.
//! Invariants: Field names come from the `Serialize` derives on `PoolStatus`
//! and `ResourceInfo`; delays are reported in milliseconds.

use serde::Serialize;
use serde_json::Value;
use writerpool::api::{Error, ErrorKind, PoolStatus, ResourceInfo};

pub(crate) fn status_json(status: &PoolStatus, resources: &[ResourceInfo]) -> Result<Value, Error> {
    let mut value = to_json(status)?;
    if let Value::Object(map) = &mut value {
        map.insert("resources".to_string(), to_json(resources)?);
    }
    Ok(value)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode status as json")
            .with_source(err)
    })
}
