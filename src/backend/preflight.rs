use std::collections::BTreeMap;
use std::sync::Arc;

use lopdf::encryption::{DecryptionError, decrypt_object, get_encryption_key};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use crate::error::{AppError, AppResult};
use crate::metadata::decode_text_string;

/// Bytes ready for the interpreter plus the raw document-information fields.
#[derive(Debug)]
pub struct Preflight {
    pub bytes: Arc<Vec<u8>>,
    pub info: BTreeMap<String, String>,
    pub encrypted: bool,
}

/// Parses the document structure, unlocks it when encrypted and reads the
/// `/Info` dictionary. Encrypted input is re-serialized without its security
/// handler so that the interpreter sees plain objects.
pub fn preflight(bytes: Arc<Vec<u8>>, password: Option<&str>) -> AppResult<Preflight> {
    let mut document = Document::load_mem(bytes.as_slice())
        .map_err(|err| AppError::parse(format!("failed to read document structure: {err}")))?;

    let encrypted = document.is_encrypted();
    let bytes = if encrypted {
        debug!(has_password = password.is_some(), "document is encrypted");
        unlock(&mut document, password.unwrap_or_default())?;

        let mut plain = Vec::with_capacity(bytes.len());
        document.save_to(&mut plain).map_err(|err| {
            AppError::parse(format!("failed to rewrite decrypted document: {err}"))
        })?;
        Arc::new(plain)
    } else {
        bytes
    };

    let info = read_info(&document);
    trace!(fields = info.len(), "read document info");

    Ok(Preflight {
        bytes,
        info,
        encrypted,
    })
}

/// Runs the standard security handler (RC4 for V1/V2, RC4 or AESV2 crypt
/// filters for V4) over every string and stream, then drops `/Encrypt`.
fn unlock(document: &mut Document, password: &str) -> AppResult<()> {
    let encrypt_id = document
        .trailer
        .get(b"Encrypt")
        .and_then(Object::as_reference)
        .map_err(|err| AppError::parse(format!("invalid encryption dictionary: {err}")))?;
    let handler = document
        .get_dictionary(encrypt_id)
        .map_err(|err| AppError::parse(format!("invalid encryption dictionary: {err}")))?;

    let aes = uses_aes(handler)?;
    let encrypt_metadata = handler
        .get(b"EncryptMetadata")
        .and_then(Object::as_bool)
        .unwrap_or(true);

    let key = get_encryption_key(document, password, true).map_err(|err| match err {
        DecryptionError::IncorrectPassword if password.is_empty() => {
            AppError::decryption("password required")
        }
        DecryptionError::IncorrectPassword => AppError::decryption("incorrect password"),
        other => AppError::parse(format!("unsupported security handler: {other}")),
    })?;

    for (&id, object) in document.objects.iter_mut() {
        if id == encrypt_id {
            continue;
        }
        if let Object::Stream(stream) = object {
            let kind = stream.dict.get(b"Type").and_then(Object::as_name).ok();
            if kind == Some(b"XRef".as_slice())
                || (kind == Some(b"Metadata".as_slice()) && !encrypt_metadata)
            {
                continue;
            }
        }
        decrypt_in_place(object, id, &key, aes)?;
    }

    document.trailer.remove(b"Encrypt");
    Ok(())
}

fn uses_aes(handler: &Dictionary) -> AppResult<bool> {
    let version = handler.get(b"V").and_then(Object::as_i64).unwrap_or(0);
    if version != 4 {
        return Ok(false);
    }

    let method = handler
        .get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|filters| filters.get(b"StdCF"))
        .and_then(Object::as_dict)
        .and_then(|filter| filter.get(b"CFM"))
        .and_then(Object::as_name);
    match method {
        Ok(b"AESV2") => Ok(true),
        Ok(b"V2") | Ok(b"None") | Err(_) => Ok(false),
        Ok(other) => Err(AppError::parse(format!(
            "unsupported crypt filter method: {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

// Strings nested in dictionaries and arrays are keyed by their enclosing
// indirect object.
fn decrypt_in_place(object: &mut Object, id: ObjectId, key: &[u8], aes: bool) -> AppResult<()> {
    match object {
        Object::String(..) | Object::Stream(_) => {
            if aes && !is_aes_payload(object) {
                return Err(AppError::parse(format!(
                    "encrypted object {} {} is not a valid AES payload",
                    id.0, id.1
                )));
            }
            let plain = decrypt_object(key, id, object, aes)
                .map_err(|err| AppError::parse(format!("failed to decrypt object: {err}")))?;
            match object {
                Object::Stream(stream) => stream.set_content(plain),
                Object::String(content, _) => *content = plain,
                _ => {}
            }
        }
        Object::Array(items) => {
            for item in items {
                decrypt_in_place(item, id, key, aes)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                decrypt_in_place(value, id, key, aes)?;
            }
        }
        _ => {}
    }
    Ok(())
}

// An IV block followed by whole cipher blocks.
fn is_aes_payload(object: &Object) -> bool {
    let data = match object {
        Object::String(content, _) => content.as_slice(),
        Object::Stream(stream) => stream.content.as_slice(),
        _ => return false,
    };
    data.len() >= 32 && data.len() % 16 == 0
}

fn read_info(document: &Document) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();

    let Ok(entry) = document.trailer.get(b"Info") else {
        return info;
    };
    let Ok((_, Object::Dictionary(dict))) = document.dereference(entry) else {
        return info;
    };

    for (key, value) in dict.iter() {
        let value = match document.dereference(value) {
            Ok((_, value)) => value,
            Err(_) => continue,
        };
        let text = match value {
            Object::String(bytes, _) => decode_text_string(bytes),
            Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
            _ => continue,
        };
        info.insert(String::from_utf8_lossy(key).into_owned(), text);
    }

    info
}
