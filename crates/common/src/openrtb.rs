//! OpenRTB 2.5 request and response subset used by the OpenRTB exchanges.
//!
//! Only the fields the adapters set or read are typed. Everything else rides
//! along in `extra` so first-party data merged in from `ortb2` survives
//! serialization unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenRtbRequest {
    pub id: String,
    pub imp: Vec<Imp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regs: Option<Regs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cur: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Imp {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<Native>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloorcur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Banner {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub format: Vec<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topframe: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Video {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mimes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minduration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxduration: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startdelay: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plcmt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub playbackmethod: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<u32>,
}

/// `request` is the Native request object serialized to a string, as
/// OpenRTB 2.5 requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Native {
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Regs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coppa: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<RegsExt>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegsExt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenRtbResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub seatbid: Vec<SeatBid>,
    #[serde(default)]
    pub cur: Option<String>,
    /// No-bid reason.
    #[serde(default)]
    pub nbr: Option<u32>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeatBid {
    #[serde(default)]
    pub bid: Vec<Bid>,
    #[serde(default)]
    pub seat: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bid {
    #[serde(default)]
    pub id: Option<String>,
    pub impid: String,
    pub price: f64,
    #[serde(default)]
    pub adm: Option<String>,
    #[serde(default)]
    pub nurl: Option<String>,
    #[serde(default)]
    pub burl: Option<String>,
    #[serde(default)]
    pub adomain: Vec<String>,
    #[serde(default)]
    pub crid: Option<String>,
    #[serde(default)]
    pub dealid: Option<String>,
    #[serde(default)]
    pub w: Option<u32>,
    #[serde(default)]
    pub h: Option<u32>,
    /// Markup type: 1 banner, 2 video, 3 audio, 4 native.
    #[serde(default)]
    pub mtype: Option<u8>,
    /// Seconds the bid stays valid.
    #[serde(default)]
    pub exp: Option<u32>,
    #[serde(default)]
    pub ext: Option<Value>,
}
