// Résumé domain: the canonical stored document, the editable form projection,
// and the normalizer that maps between them.

pub mod document;
pub mod form;
pub mod normalize;

pub use form::FormState;
pub use normalize::{normalize, to_document_value};
