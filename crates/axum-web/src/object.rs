use async_trait::async_trait;
use axum::{
    body::HttpBody,
    extract::{FromRequest, FromRequestParts},
    http::{
        header::{self, HeaderMap, HeaderValue},
        request::{Parts, Request},
        StatusCode,
    },
    response::{IntoResponse, Response},
    BoxError,
};
use base64::{engine::general_purpose, Engine as _};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{
    de::{self, DeserializeOwned, Visitor},
    ser::Serializer,
    Deserialize, Deserializer, Serialize,
};
use std::{
    collections::HashSet,
    error::Error,
    fmt,
    ops::{Deref, DerefMut},
    str::FromStr,
};

use crate::encoding::Encoding;
use crate::erring::HTTPError;

/// PackObject carries a value together with the negotiated wire encoding
/// (JSON or CBOR), so handlers can answer in the format they were asked in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackObject<T> {
    Json(T),
    Cbor(T),
}

impl<T> PackObject<T> {
    pub fn unwrap(self) -> T {
        match self {
            PackObject::Json(v) => v,
            PackObject::Cbor(v) => v,
        }
    }

    pub fn unwrap_ref(&self) -> &T {
        match self {
            PackObject::Json(ref v) => v,
            PackObject::Cbor(ref v) => v,
        }
    }

    pub fn unpack(self) -> (PackObject<()>, T) {
        match self {
            PackObject::Json(v) => (PackObject::Json(()), v),
            PackObject::Cbor(v) => (PackObject::Cbor(()), v),
        }
    }

    pub fn unit(&self) -> PackObject<()> {
        match self {
            PackObject::Json(_) => PackObject::Json(()),
            PackObject::Cbor(_) => PackObject::Cbor(()),
        }
    }

    pub fn with<U>(&self, v: U) -> PackObject<U> {
        match self {
            PackObject::Json(_) => PackObject::Json(v),
            PackObject::Cbor(_) => PackObject::Cbor(v),
        }
    }

    pub fn with_option<U>(&self, v: Option<U>) -> Option<PackObject<U>> {
        v.map(|v| self.with(v))
    }

    pub fn with_vec<U>(&self, vv: Vec<U>) -> Vec<PackObject<U>> {
        match self {
            PackObject::Json(_) => vv.into_iter().map(PackObject::Json).collect(),
            PackObject::Cbor(_) => vv.into_iter().map(PackObject::Cbor).collect(),
        }
    }

    pub fn with_set<U>(&self, vv: HashSet<U>) -> Vec<PackObject<U>> {
        match self {
            PackObject::Json(_) => vv.into_iter().map(PackObject::Json).collect(),
            PackObject::Cbor(_) => vv.into_iter().map(PackObject::Cbor).collect(),
        }
    }
}

impl<T: Default> Default for PackObject<T> {
    fn default() -> Self {
        PackObject::Json(T::default())
    }
}

impl<T> Deref for PackObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.unwrap_ref()
    }
}

impl<T> DerefMut for PackObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            PackObject::Json(ref mut v) => v,
            PackObject::Cbor(ref mut v) => v,
        }
    }
}

pub fn cbor_to_vec<T: Serialize>(val: &T) -> anyhow::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    ciborium::into_writer(val, &mut buf)?;
    Ok(buf)
}

pub fn cbor_from_slice<T: DeserializeOwned>(data: &[u8]) -> anyhow::Result<T> {
    let val = ciborium::from_reader(data)?;
    Ok(val)
}

impl Serialize for PackObject<()> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_none()
    }
}

impl Serialize for PackObject<Vec<u8>> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PackObject::Json(v) => {
                serializer.serialize_str(general_purpose::URL_SAFE_NO_PAD.encode(v).as_str())
            }
            PackObject::Cbor(v) => serializer.serialize_bytes(v),
        }
    }
}

impl Serialize for PackObject<xid::Id> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PackObject::Json(v) => serializer.serialize_str(v.to_string().as_str()),
            PackObject::Cbor(v) => serializer.serialize_bytes(v.as_bytes()),
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = PackObject<xid::Id>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("xid string or 12 bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        xid::Id::from_str(v)
            .map(PackObject::Json)
            .map_err(|err| de::Error::custom(format!("invalid xid, {}", err)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        if v.len() != 12 {
            return Err(de::Error::invalid_length(v.len(), &self));
        }
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(v);
        Ok(PackObject::Cbor(xid::Id(bytes)))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        self.visit_bytes(&v)
    }
}

impl<'de> Deserialize<'de> for PackObject<xid::Id> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IdVisitor)
    }
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = PackObject<Vec<u8>>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("base64url string or bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        general_purpose::URL_SAFE_NO_PAD
            .decode(v)
            .map(PackObject::Json)
            .map_err(|err| de::Error::custom(format!("invalid base64, {}", err)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(PackObject::Cbor(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(PackObject::Cbor(v))
    }
}

impl<'de> Deserialize<'de> for PackObject<Vec<u8>> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(BytesVisitor)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PackObject<()>
where
    S: Send + Sync,
{
    type Rejection = HTTPError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match get_content_type(&parts.headers) {
            Ok(ot) => Ok(ot),
            Err(mut ct) => {
                if let Some(accept) = parts.headers.get(header::ACCEPT) {
                    if let Ok(accept) = accept.to_str() {
                        if accept.contains("application/cbor") {
                            return Ok(PackObject::Cbor(()));
                        }
                        if accept.contains("application/json") {
                            return Ok(PackObject::Json(()));
                        }
                        ct = accept.to_string();
                    }
                }

                Err(HTTPError::new(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE.as_u16(),
                    format!("Unsupported media type, {}", ct),
                ))
            }
        }
    }
}

#[async_trait]
impl<T, S, B> FromRequest<S, B> for PackObject<T>
where
    T: DeserializeOwned + Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = HTTPError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers();
        let ct = get_content_type(headers).map_err(|ct| {
            HTTPError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE.as_u16(),
                format!("Unsupported media type, {}", ct),
            )
        })?;

        let enc = Encoding::from_header_value(headers.get(header::CONTENT_ENCODING));
        let mut bytes = Bytes::from_request(req, state).await.map_err(|err| {
            HTTPError::new(
                StatusCode::BAD_REQUEST.as_u16(),
                format!("Invalid body, {}", err),
            )
        })?;

        if !enc.identity() {
            bytes = enc
                .decode_all(bytes.reader())
                .map_err(|err| {
                    HTTPError::new(
                        StatusCode::BAD_REQUEST.as_u16(),
                        format!("Invalid body, {}", err),
                    )
                })?
                .into();
        }

        match ct {
            PackObject::Json(_) => {
                let value: T = serde_json::from_slice(&bytes).map_err(|err| {
                    HTTPError::new(
                        StatusCode::BAD_REQUEST.as_u16(),
                        format!("Invalid JSON body, {}", err),
                    )
                })?;
                Ok(PackObject::Json(value))
            }
            PackObject::Cbor(_) => {
                let value: T = ciborium::from_reader(&bytes[..]).map_err(|err| {
                    HTTPError::new(
                        StatusCode::BAD_REQUEST.as_u16(),
                        format!("Invalid CBOR body, {}", err),
                    )
                })?;
                Ok(PackObject::Cbor(value))
            }
        }
    }
}

fn get_content_type(headers: &HeaderMap) -> Result<PackObject<()>, String> {
    let content_type = if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        content_type
    } else {
        return Err("".to_string());
    };

    let content_type = if let Ok(content_type) = content_type.to_str() {
        content_type
    } else {
        return Err("".to_string());
    };

    if let Ok(mime) = content_type.parse::<mime::Mime>() {
        if mime.type_() == "application" {
            if mime.subtype() == "cbor" || mime.suffix().map_or(false, |name| name == "cbor") {
                return Ok(PackObject::Cbor(()));
            } else if mime.subtype() == "json" || mime.suffix().map_or(false, |name| name == "json")
            {
                return Ok(PackObject::Json(()));
            }
        }
    }

    Err(content_type.to_string())
}

impl<T> IntoResponse for PackObject<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let mut buf = BytesMut::with_capacity(128).writer();
        let res: Result<Response, Box<dyn Error>> = match self {
            PackObject::Json(v) => match serde_json::to_writer(&mut buf, &v) {
                Ok(()) => Ok((
                    [(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()),
                    )],
                    buf.into_inner().freeze(),
                )
                    .into_response()),
                Err(err) => Err(Box::new(err)),
            },
            PackObject::Cbor(v) => match ciborium::into_writer(&v, &mut buf) {
                Ok(()) => Ok((
                    [(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/cbor"),
                    )],
                    buf.into_inner().freeze(),
                )
                    .into_response()),
                Err(err) => Err(Box::new(err)),
            },
        };

        match res {
            Ok(res) => res,
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref()),
                )],
                err.to_string(),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_object_works() {
        let po = PackObject::Cbor(3i64);
        let (to, v) = po.unpack();
        assert_eq!(v, 3i64);
        assert_eq!(to, PackObject::Cbor(()));
        assert_eq!(to.with("s"), PackObject::Cbor("s"));
        assert_eq!(to.with_option(None::<i64>), None);
        assert_eq!(to.with_vec(vec![1, 2]).len(), 2);
    }

    #[test]
    fn xid_roundtrip_works() {
        let id = xid::new();

        let data = cbor_to_vec(&PackObject::Cbor(id)).unwrap();
        let rt: PackObject<xid::Id> = cbor_from_slice(&data).unwrap();
        assert_eq!(rt.unwrap(), id);

        let data = serde_json::to_vec(&PackObject::Json(id)).unwrap();
        let rt: PackObject<xid::Id> = serde_json::from_slice(&data).unwrap();
        assert_eq!(rt.unwrap(), id);
    }

    #[test]
    fn bytes_roundtrip_works() {
        let data = serde_json::to_vec(&PackObject::Json(vec![1u8, 2, 3])).unwrap();
        let rt: PackObject<Vec<u8>> = serde_json::from_slice(&data).unwrap();
        assert_eq!(rt.unwrap(), vec![1u8, 2, 3]);
    }
}
