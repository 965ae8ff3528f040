//! Request and response shapes of the object HTTP API, shared with the server.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use speckle_types::ObjectId;

use crate::error::{TransportError, TransportResult};

/// One record in an upload batch (`POST /objects/{stream}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectUpload<'a> {
    pub id: ObjectId,
    pub body: Cow<'a, str>,
}

/// Body of `POST /api/getobjects/{stream}` and `POST /api/diff/{stream}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIdsRequest {
    pub objects: Vec<ObjectId>,
}

/// Download responses are `text/plain`, one `id\tbody` pair per line.
pub fn encode_lines<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = (&'a ObjectId, &'a str)>,
{
    let mut out = String::new();
    for (id, body) in records {
        out.push_str(&id.to_hex());
        out.push('\t');
        out.push_str(body);
        out.push('\n');
    }
    out
}

pub fn parse_lines(text: &str) -> TransportResult<HashMap<ObjectId, String>> {
    let mut found = HashMap::new();
    for line in text.lines().filter(|line| !line.is_empty()) {
        let Some((id, body)) = line.split_once('\t') else {
            return Err(TransportError::Malformed(format!(
                "download line without a tab: {:.40}",
                line
            )));
        };
        let id = ObjectId::from_hex(id).map_err(|e| TransportError::Malformed(e.to_string()))?;
        found.insert(id, body.to_string());
    }
    Ok(found)
}
