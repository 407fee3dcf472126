pub mod compiler;
pub mod qual;

pub use compiler::{coerce, compile, CompiledQuery, QueryBuilder, SqlParam};
pub use qual::{ColumnDescriptor, ColumnType, FilterExpr, Operator, QualValue, Qualifier};
