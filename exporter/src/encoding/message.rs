use bytes::{Buf, BufMut};
use prost::encoding::{DecodeContext, WireType};

/// A message decoded against a runtime [`crate::schema::MessageDescriptor`].
///
/// Fields are kept in descriptor order together with their field numbers. Unset optional fields
/// are simply absent. Encoding only; decoded input is skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicMessage {
    fields: Vec<(u32, FieldValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int64(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Message(DynamicMessage),
    /// Elements of a repeated field, written unpacked with the field's number.
    Repeated(Vec<FieldValue>),
}

impl DynamicMessage {
    pub fn push(&mut self, number: u32, value: FieldValue) {
        self.fields.push((number, value));
    }

    pub fn get(&self, number: u32) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field_number, _)| *field_number == number)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl prost::Message for DynamicMessage {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        for (tag, value) in &self.fields {
            field_encode_prost(value, *tag, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        prost::encoding::skip_field(wire_type, tag, buf, ctx)
    }

    fn encoded_len(&self) -> usize {
        self.fields
            .iter()
            .map(|(tag, value)| field_encoded_len_prost(value, *tag))
            .sum()
    }

    fn clear(&mut self) {
        self.fields.clear();
    }
}

fn field_encode_prost(value: &FieldValue, tag: u32, buf: &mut impl BufMut) {
    match value {
        FieldValue::Bool(b) => prost::encoding::bool::encode(tag, b, buf),
        FieldValue::Int64(i) => prost::encoding::int64::encode(tag, i, buf),
        FieldValue::Double(d) => prost::encoding::double::encode(tag, d, buf),
        FieldValue::String(s) => prost::encoding::string::encode(tag, s, buf),
        FieldValue::Bytes(b) => prost::encoding::bytes::encode(tag, b, buf),
        FieldValue::Message(m) => prost::encoding::message::encode(tag, m, buf),
        FieldValue::Repeated(values) => {
            for value in values {
                field_encode_prost(value, tag, buf);
            }
        }
    }
}

fn field_encoded_len_prost(value: &FieldValue, tag: u32) -> usize {
    match value {
        FieldValue::Bool(b) => prost::encoding::bool::encoded_len(tag, b),
        FieldValue::Int64(i) => prost::encoding::int64::encoded_len(tag, i),
        FieldValue::Double(d) => prost::encoding::double::encoded_len(tag, d),
        FieldValue::String(s) => prost::encoding::string::encoded_len(tag, s),
        FieldValue::Bytes(b) => prost::encoding::bytes::encoded_len(tag, b),
        FieldValue::Message(m) => prost::encoding::message::encoded_len(tag, m),
        FieldValue::Repeated(values) => values
            .iter()
            .map(|value| field_encoded_len_prost(value, tag))
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[derive(Clone, PartialEq, Message)]
    struct Expected {
        #[prost(string, optional, tag = "1")]
        name: Option<String>,
        #[prost(int64, repeated, packed = "false", tag = "2")]
        counts: Vec<i64>,
        #[prost(message, optional, tag = "3")]
        nested: Option<ExpectedNested>,
        #[prost(bool, optional, tag = "4")]
        flag: Option<bool>,
    }

    #[derive(Clone, PartialEq, Message)]
    struct ExpectedNested {
        #[prost(double, optional, tag = "1")]
        ratio: Option<f64>,
    }

    #[test]
    fn test_dynamic_message_matches_derived_encoding() {
        let mut nested = DynamicMessage::default();
        nested.push(1, FieldValue::Double(0.25));

        let mut message = DynamicMessage::default();
        message.push(1, FieldValue::String("Acme".to_owned()));
        message.push(
            2,
            FieldValue::Repeated(vec![FieldValue::Int64(1), FieldValue::Int64(-2)]),
        );
        message.push(3, FieldValue::Message(nested));
        message.push(4, FieldValue::Bool(false));

        let bytes = message.encode_to_vec();
        assert_eq!(bytes.len(), message.encoded_len());

        let decoded = Expected::decode(bytes.as_slice()).unwrap();
        assert_eq!(
            decoded,
            Expected {
                name: Some("Acme".to_owned()),
                counts: vec![1, -2],
                nested: Some(ExpectedNested { ratio: Some(0.25) }),
                flag: Some(false),
            }
        );
    }

    #[test]
    fn test_decoding_skips_everything() {
        let mut message = DynamicMessage::default();
        message.push(1, FieldValue::String("a".to_owned()));
        let bytes = message.encode_to_vec();

        let decoded = DynamicMessage::decode(bytes.as_slice()).unwrap();
        assert!(decoded.is_empty());
    }
}
