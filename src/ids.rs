use rand::RngCore;
use uuid::Uuid;

/// Message ids are plain UUIDs, same as the cloud service.
pub fn message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Handle identifying one message-move task.
pub fn task_handle() -> String {
    Uuid::new_v4().to_string()
}

/// Receipt handles must be unguessable and unique per receive attempt:
/// 32 random bytes, hex-encoded. The handle never encodes the message id;
/// the in-flight map is the only place the association lives.
pub fn receipt_handle() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
