use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

/// Compact JSON with a space after every `:` and `,`, the shape the
/// responders have always answered with.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serializes a response body. Bodies are plain structs of strings and
/// integers, for which serialization into memory can't fail.
pub fn to_string<T: Serialize>(value: &T) -> String {
    let mut buf = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value
        .serialize(&mut serializer)
        .expect("Response bodies only hold strings and integers");
    String::from_utf8(buf).expect("serde_json always writes valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Body<'a> {
        name: &'a str,
        items: [&'a str; 2],
        count: u32,
    }

    #[test]
    fn writing_spaced_json() {
        let body = Body {
            name: "a\"b",
            items: ["x", "y"],
            count: 3,
        };

        assert_eq!(
            to_string(&body),
            r#"{"name": "a\"b", "items": ["x", "y"], "count": 3}"#
        );
    }
}
