// Device ID for anonymous sign-in metadata
// Format: "reflect-<uuid>", stored in the local kv table

use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::LocalStore;

const DEVICE_ID_KEY: &str = "device_id";
const DEVICE_ID_PREFIX: &str = "reflect-";

/// Error type for device ID operations
#[derive(Debug, thiserror::Error)]
pub enum DeviceIdError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid device ID format: {0}")]
    InvalidFormat(String),
}

/// Get or create the device ID stored in `store`.
///
/// # Returns
/// Device ID string in format "reflect-<uuid>"
pub fn get_or_create_device_id(store: &LocalStore) -> Result<String, DeviceIdError> {
    if let Some(existing) = store.kv_get(DEVICE_ID_KEY)? {
        let device_id = existing.trim().to_string();
        if device_id.starts_with(DEVICE_ID_PREFIX) {
            return Ok(device_id);
        }
        return Err(DeviceIdError::InvalidFormat(device_id));
    }

    let device_id = format!("{}{}", DEVICE_ID_PREFIX, Uuid::new_v4());
    store.kv_set(DEVICE_ID_KEY, &device_id)?;
    Ok(device_id)
}
