//! Record serialization and ordering.
//!
//! The sorter never looks inside records: it asks a [`Serializer`] to order them, to sort in-memory batches
//! and to move them to and from run files.

use std::cmp::Ordering;
use std::error::Error;
use std::io::{self, prelude::*};
use std::marker::PhantomData;

/// Serializer interface. Provides record ordering and run file encoding/decoding.
pub trait Serializer<T> {
    /// Encoding error.
    type SerializationError: Error + 'static;
    /// Decoding error.
    type DeserializationError: Error + 'static;

    /// Compares two records.
    fn compare(&self, a: &T, b: &T) -> Ordering;

    /// Checks whether two records are duplicates of each other. Used to drop adjacent duplicates when
    /// `distinct` is enabled. Defaults to comparator equality; override it when the comparator orders
    /// by a key only and records sharing a key must be kept.
    fn equal(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Sorts an in-memory batch. The default implementation is a stable sort using [`Serializer::compare`].
    fn sort(&self, batch: &mut [T]) {
        batch.sort_by(|a, b| self.compare(a, b));
    }

    /// Writes a single record.
    fn write<W: Write>(&self, writer: &mut W, item: &T) -> Result<(), Self::SerializationError>;

    /// Reads the next record. Returns [`None`] once the reader is drained.
    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<T, Self::DeserializationError>>;

    /// Writes all records in order.
    fn encode<I, W>(&self, items: I, writer: &mut W) -> Result<(), Self::SerializationError>
    where
        I: IntoIterator<Item = T>,
        W: Write,
    {
        for item in items.into_iter() {
            self.write(writer, &item)?;
        }

        return Ok(());
    }

    /// Returns a lazy iterator over the records of the reader.
    fn decode<R: BufRead>(&self, reader: R) -> Decoder<'_, T, Self, R>
    where
        Self: Sized,
    {
        Decoder {
            serializer: self,
            reader,
            item_type: PhantomData,
        }
    }
}

/// Lazy record decoder created by [`Serializer::decode`].
pub struct Decoder<'a, T, S, R> {
    serializer: &'a S,
    reader: R,

    item_type: PhantomData<fn() -> T>,
}

impl<'a, T, S, R> Iterator for Decoder<'a, T, S, R>
where
    S: Serializer<T>,
    R: BufRead,
{
    type Item = Result<T, S::DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.serializer.read(&mut self.reader)
    }
}

/// RMP (Rust MessagePack) serializer.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpSerializer<T, F = fn(&T, &T) -> Ordering> {
    compare: F,

    item_type: PhantomData<fn() -> T>,
}

impl<T, F> RmpSerializer<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates a serializer ordering records with a custom compare function.
    pub fn with_compare(compare: F) -> Self {
        RmpSerializer {
            compare,
            item_type: PhantomData,
        }
    }
}

impl<T: Ord> Default for RmpSerializer<T> {
    fn default() -> Self {
        RmpSerializer {
            compare: T::cmp,
            item_type: PhantomData,
        }
    }
}

impl<T, F> Serializer<T> for RmpSerializer<T, F>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
    F: Fn(&T, &T) -> Ordering,
{
    type SerializationError = rmp_serde::encode::Error;
    type DeserializationError = rmp_serde::decode::Error;

    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.compare)(a, b)
    }

    fn write<W: Write>(&self, writer: &mut W, item: &T) -> Result<(), Self::SerializationError> {
        rmp_serde::encode::write(writer, item)
    }

    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<T, Self::DeserializationError>> {
        match reader.fill_buf().map(|buf| buf.is_empty()) {
            Ok(true) => None,
            Ok(false) => Some(rmp_serde::decode::from_read(reader)),
            Err(err) => Some(Err(rmp_serde::decode::Error::InvalidMarkerRead(err))),
        }
    }
}

/// Newline delimited text serializer. Records are lines without the trailing `\n`, any other byte
/// including `\r` is kept as is. Records containing `\n` are rejected on write.
pub struct LineSerializer<F = fn(&String, &String) -> Ordering> {
    compare: F,
}

impl<F> LineSerializer<F>
where
    F: Fn(&String, &String) -> Ordering,
{
    /// Creates a serializer ordering lines with a custom compare function.
    pub fn with_compare(compare: F) -> Self {
        LineSerializer { compare }
    }
}

impl Default for LineSerializer {
    fn default() -> Self {
        LineSerializer { compare: String::cmp }
    }
}

impl<F> Serializer<String> for LineSerializer<F>
where
    F: Fn(&String, &String) -> Ordering,
{
    type SerializationError = io::Error;
    type DeserializationError = io::Error;

    fn compare(&self, a: &String, b: &String) -> Ordering {
        (self.compare)(a, b)
    }

    fn write<W: Write>(&self, writer: &mut W, item: &String) -> Result<(), Self::SerializationError> {
        if item.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "line record contains a line break",
            ));
        }
        writer.write_all(item.as_bytes())?;
        writer.write_all(b"\n")
    }

    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<String, Self::DeserializationError>> {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;
    use std::io;

    use rstest::*;

    use super::{LineSerializer, RmpSerializer, Serializer};

    #[test]
    fn test_rmp_serializer() {
        let serializer: RmpSerializer<(u32, String)> = RmpSerializer::default();
        let saved = Vec::from_iter((0..50).map(|i| (i, format!("item-{}", i))));

        let mut bytes = Vec::new();
        serializer.encode(saved.clone(), &mut bytes).unwrap();

        let restored: Result<Vec<(u32, String)>, _> = serializer.decode(io::Cursor::new(bytes)).collect();
        assert_eq!(restored.unwrap(), saved);
    }

    #[test]
    fn test_rmp_serializer_empty_input() {
        let serializer: RmpSerializer<i32> = RmpSerializer::default();

        let mut decoder = serializer.decode(io::Cursor::new(Vec::new()));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_rmp_serializer_truncated_input() {
        let serializer: RmpSerializer<String> = RmpSerializer::default();

        let mut bytes = Vec::new();
        serializer.write(&mut bytes, &"truncated".to_string()).unwrap();
        bytes.truncate(bytes.len() - 3);

        let mut decoder = serializer.decode(io::Cursor::new(bytes));
        assert!(matches!(decoder.next(), Some(Err(_))));
    }

    #[test]
    fn test_rmp_serializer_custom_compare() {
        let serializer: RmpSerializer<i32, _> = RmpSerializer::with_compare(|a: &i32, b: &i32| a.cmp(b).reverse());

        let mut batch = vec![3, 1, 2];
        serializer.sort(&mut batch);

        assert_eq!(batch, vec![3, 2, 1]);
        assert_eq!(serializer.compare(&1, &2), Ordering::Greater);
    }

    #[rstest]
    #[case("", vec![])]
    #[case("a\nb\n", vec!["a", "b"])]
    #[case("a\r\nb", vec!["a\r", "b"])]
    #[case("\n\nc\n", vec!["", "", "c"])]
    fn test_line_serializer_decode(#[case] input: &str, #[case] expected: Vec<&str>) {
        let serializer = LineSerializer::default();

        let actual: Result<Vec<String>, _> = serializer.decode(input.as_bytes()).collect();
        assert_eq!(actual.unwrap(), expected);
    }

    #[test]
    fn test_line_serializer_encode() {
        let serializer = LineSerializer::default();

        let mut bytes = Vec::new();
        serializer
            .encode(vec!["b".to_string(), "a".to_string()], &mut bytes)
            .unwrap();

        assert_eq!(bytes, b"b\na\n");
    }
    #[rstest]
    #[case("plain")]
    #[case("trailing\r")]
    #[case("")]
    #[case(" \t ")]
    fn test_line_serializer_round_trip(#[case] line: &str) {
        let serializer = LineSerializer::default();

        let mut bytes = Vec::new();
        serializer.write(&mut bytes, &line.to_string()).unwrap();

        let restored: Result<Vec<String>, _> = serializer.decode(bytes.as_slice()).collect();
        assert_eq!(restored.unwrap(), vec![line]);
    }

    #[test]
    fn test_line_serializer_rejects_line_break() {
        let serializer = LineSerializer::default();

        let mut bytes = Vec::new();
        let err = serializer.write(&mut bytes, &"two\nlines".to_string()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(bytes.is_empty());
    }
}
