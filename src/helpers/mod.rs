pub mod field_split;
