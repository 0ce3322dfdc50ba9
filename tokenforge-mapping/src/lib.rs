//! Field mapping between the flat token form and normalized storage.

pub mod codec;
pub mod mapper;
pub mod merge;

pub use codec::{check_stored_fields, FormData};
pub use mapper::{
    aggregate_to_form, map_form, standard_from_form, to_form, to_storage, CoreFields, MappedForm,
};
pub use merge::merge_form;
