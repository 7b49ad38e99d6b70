//! Domain records for parcels and transfers

mod parcel;
mod transfer;

pub use parcel::{
    validate_postal_code, Address, AttachDocumentInput, CreateParcelInput, DocumentRef,
    GeoLocation, OwnershipInterval, Parcel, ParcelClassification, ParcelQuery, ParcelStatus,
    UpdateParcelInput, VerificationStatus,
};
pub use transfer::{
    Approval, FeeBreakdown, InitiateTransferInput, Transfer, TransferStatus, TransferType,
};
