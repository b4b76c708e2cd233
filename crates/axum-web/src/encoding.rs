use axum::http::header::HeaderValue;
use std::io::{Error, ErrorKind, Read};

// responses smaller than this are not worth compressing
pub const MIN_ENCODING_SIZE: u16 = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Zstd,
}

impl Encoding {
    pub fn from_header_value(val: Option<&HeaderValue>) -> Self {
        match val.and_then(|v| v.to_str().ok()) {
            Some(v) if v.contains("zstd") => Encoding::Zstd,
            Some(v) if v.contains("gzip") => Encoding::Gzip,
            _ => Encoding::Identity,
        }
    }

    pub fn identity(&self) -> bool {
        *self == Encoding::Identity
    }

    pub fn decode_all<R: Read>(&self, r: R) -> Result<Vec<u8>, Error> {
        match self {
            Encoding::Identity => {
                let mut r = r;
                let mut buf: Vec<u8> = Vec::new();
                r.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Encoding::Gzip => {
                let mut decoder = libflate::gzip::Decoder::new(r)?;
                let mut buf: Vec<u8> = Vec::new();
                decoder.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Encoding::Zstd => {
                zstd::stream::decode_all(r).map_err(|err| Error::new(ErrorKind::InvalidData, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_header_value_works() {
        assert_eq!(Encoding::from_header_value(None), Encoding::Identity);
        assert_eq!(
            Encoding::from_header_value(Some(&HeaderValue::from_static("gzip"))),
            Encoding::Gzip
        );
        assert_eq!(
            Encoding::from_header_value(Some(&HeaderValue::from_static("zstd"))),
            Encoding::Zstd
        );
        assert_eq!(
            Encoding::from_header_value(Some(&HeaderValue::from_static("br"))),
            Encoding::Identity
        );
    }

    #[test]
    fn decode_all_works() {
        let data = b"hello world".to_vec();
        let rt = Encoding::Identity.decode_all(&data[..]).unwrap();
        assert_eq!(rt, data);

        let compressed = zstd::stream::encode_all(&data[..], 0).unwrap();
        let rt = Encoding::Zstd.decode_all(&compressed[..]).unwrap();
        assert_eq!(rt, data);
    }
}
