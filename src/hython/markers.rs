//! Marker-delimited payload extraction from interpreter stdout.
//!
//! A payload is the text strictly between the first start marker and the
//! first end marker after it, trimmed. Houdini's own banner and warnings can
//! appear anywhere outside the block.

/// Start/end tokens for one payload block.
///
/// The generator prints exactly these strings, so they must match byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPair {
    pub start: &'static str,
    pub end: &'static str,
}

pub const NODE_LIST: MarkerPair = MarkerPair {
    start: "NODE_LIST_START",
    end: "NODE_LIST_END",
};

pub const PARAM_LIST: MarkerPair = MarkerPair {
    start: "PARAM_LIST_START",
    end: "PARAM_LIST_END",
};

pub const PARM_VALUE: MarkerPair = MarkerPair {
    start: "PARM_VALUE_START",
    end: "PARM_VALUE_END",
};

/// Why a block could not be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingMarker {
    Start(&'static str),
    End(&'static str),
}

impl MissingMarker {
    pub fn marker(self) -> &'static str {
        match self {
            MissingMarker::Start(m) | MissingMarker::End(m) => m,
        }
    }
}

/// Extract the trimmed payload between a marker pair.
pub fn extract_block<'a>(stdout: &'a str, markers: MarkerPair) -> Result<&'a str, MissingMarker> {
    let start = stdout
        .find(markers.start)
        .ok_or(MissingMarker::Start(markers.start))?;
    let after_start = &stdout[start + markers.start.len()..];
    let end = after_start
        .find(markers.end)
        .ok_or(MissingMarker::End(markers.end))?;
    Ok(after_start[..end].trim())
}

/// Decode a block as one entry per line; an empty block is an empty list.
pub fn parse_list(stdout: &str, markers: MarkerPair) -> Result<Vec<String>, MissingMarker> {
    let payload = extract_block(stdout, markers)?;
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    Ok(payload.lines().map(str::to_string).collect())
}

/// Decode a block as a single verbatim value.
pub fn parse_scalar(stdout: &str, markers: MarkerPair) -> Result<String, MissingMarker> {
    extract_block(stdout, markers).map(str::to_string)
}
