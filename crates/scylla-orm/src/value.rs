use scylla::cql_to_rust;
use std::collections::{HashMap, HashSet};

pub use scylla::cql_to_rust::FromCqlValError;
pub use scylla::frame::response::result::CqlValue;

pub trait FromCqlVal: Sized {
    fn from_cql(cql_val: &CqlValue) -> Result<Self, FromCqlValError>;
}

pub trait ToCqlVal: Sized {
    fn to_cql(&self) -> CqlValue;
}

macro_rules! impl_cql_val {
    ($rust_type:ty, $cql_variant:ident) => {
        impl FromCqlVal for $rust_type {
            fn from_cql(cql_val: &CqlValue) -> Result<Self, FromCqlValError> {
                cql_to_rust::FromCqlVal::from_cql(cql_val.to_owned())
            }
        }

        impl ToCqlVal for $rust_type {
            fn to_cql(&self) -> CqlValue {
                CqlValue::$cql_variant(self.to_owned())
            }
        }
    };
}

impl_cql_val!(String, Text);
impl_cql_val!(bool, Boolean);
impl_cql_val!(i8, TinyInt);
impl_cql_val!(i16, SmallInt);
impl_cql_val!(i32, Int);
impl_cql_val!(i64, BigInt);
impl_cql_val!(Vec<u8>, Blob);

impl FromCqlVal for xid::Id {
    fn from_cql(val: &CqlValue) -> Result<Self, FromCqlValError> {
        match val {
            CqlValue::Blob(val) => {
                if val.len() != 12 {
                    Err(FromCqlValError::BadVal)
                } else {
                    let mut bytes = [0u8; 12];
                    bytes.copy_from_slice(val);
                    Ok(xid::Id(bytes))
                }
            }
            _ => Err(FromCqlValError::BadCqlType),
        }
    }
}

impl ToCqlVal for xid::Id {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Blob(self.as_bytes().to_vec())
    }
}

impl FromCqlVal for CqlValue {
    fn from_cql(val: &CqlValue) -> Result<Self, FromCqlValError> {
        Ok(val.to_owned())
    }
}

impl ToCqlVal for CqlValue {
    fn to_cql(&self) -> CqlValue {
        self.to_owned()
    }
}

impl<T: FromCqlVal> FromCqlVal for Vec<T> {
    fn from_cql(cql_val: &CqlValue) -> Result<Self, FromCqlValError> {
        match cql_val {
            CqlValue::List(list) => {
                let mut rt = Vec::with_capacity(list.len());
                for item in list {
                    rt.push(T::from_cql(item)?);
                }
                Ok(rt)
            }
            _ => Err(FromCqlValError::BadCqlType),
        }
    }
}

impl<T: ToCqlVal> ToCqlVal for Vec<T> {
    fn to_cql(&self) -> CqlValue {
        let mut rt: Vec<CqlValue> = Vec::with_capacity(self.len());
        for item in self {
            rt.push(item.to_cql());
        }
        CqlValue::List(rt)
    }
}

impl<T: FromCqlVal + std::cmp::Eq + std::hash::Hash> FromCqlVal for HashSet<T> {
    fn from_cql(cql_val: &CqlValue) -> Result<Self, FromCqlValError> {
        match cql_val {
            CqlValue::Set(list) => {
                let mut rt = HashSet::with_capacity(list.len());
                for item in list {
                    rt.insert(T::from_cql(item)?);
                }
                Ok(rt)
            }
            _ => Err(FromCqlValError::BadCqlType),
        }
    }
}

impl<T: ToCqlVal> ToCqlVal for HashSet<T> {
    fn to_cql(&self) -> CqlValue {
        let mut rt: Vec<CqlValue> = Vec::with_capacity(self.len());
        for item in self {
            rt.push(item.to_cql());
        }
        CqlValue::Set(rt)
    }
}

impl<T: FromCqlVal> FromCqlVal for HashMap<String, T> {
    fn from_cql(cql_val: &CqlValue) -> Result<Self, FromCqlValError> {
        match cql_val {
            CqlValue::Map(list) => {
                let mut rt = HashMap::with_capacity(list.len());
                for item in list {
                    rt.insert(String::from_cql(&item.0)?, T::from_cql(&item.1)?);
                }
                Ok(rt)
            }
            _ => Err(FromCqlValError::BadCqlType),
        }
    }
}

impl<T: ToCqlVal> ToCqlVal for HashMap<String, T> {
    fn to_cql(&self) -> CqlValue {
        let mut rt: Vec<(CqlValue, CqlValue)> = Vec::with_capacity(self.len());
        for item in self {
            rt.push((item.0.to_cql(), item.1.to_cql()));
        }
        CqlValue::Map(rt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_vals_work() {
        assert_eq!(
            "hello".to_string().to_cql(),
            CqlValue::Text("hello".to_string())
        );
        assert_eq!(true.to_cql(), CqlValue::Boolean(true));
        assert_eq!(9i32.to_cql(), CqlValue::Int(9));
        assert_eq!(bool::from_cql(&CqlValue::Boolean(true)).unwrap(), true);
        assert!(bool::from_cql(&CqlValue::Int(1)).is_err());
    }

    #[test]
    fn xid_val_works() {
        let id = xid::new();
        let val = id.to_cql();
        assert_eq!(val, CqlValue::Blob(id.as_bytes().to_vec()));
        assert_eq!(xid::Id::from_cql(&val).unwrap(), id);
        assert!(xid::Id::from_cql(&CqlValue::Blob(vec![0u8; 11])).is_err());
    }

    #[test]
    fn set_val_works() {
        let mut set: HashSet<xid::Id> = HashSet::new();
        set.insert(xid::new());
        set.insert(xid::new());
        let rt = HashSet::<xid::Id>::from_cql(&set.to_cql()).unwrap();
        assert_eq!(rt, set);
    }
}
