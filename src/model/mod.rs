//! Active-record layer
//!
//! [`RecordClass`] holds the table name, write policy, codecs and driver for
//! one kind of row; [`Record`] is a single row of it.

pub mod record;
pub mod record_class;

pub use record::{Fields, Record};
pub use record_class::{RecordClass, RecordClassBuilder, Selection, DEFAULT_PRIMARY_KEY};

/// Build a list of `(field, value)` pairs with mixed value types
///
/// ```
/// use rust_active_record::fields;
/// use rust_active_record::core::DatabaseValue;
///
/// let pairs = fields! { "name" => "foo", "age" => 10 };
/// assert_eq!(pairs[1], ("age".to_string(), DatabaseValue::Integer(10)));
/// ```
#[macro_export]
macro_rules! fields {
    ($($name:expr => $value:expr),* $(,)?) => {
        ::std::vec![
            $((
                ::std::string::String::from($name),
                $crate::core::DatabaseValue::from($value),
            )),*
        ]
    };
}
