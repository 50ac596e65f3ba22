use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each entity gets its own identifier type so a `BookId` can never be
/// passed where a `UserId` is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a library member, librarian or administrator.
    UserId
);

uuid_id!(
    /// Identifier of a catalogued book (all of its copies share it).
    BookId
);

uuid_id!(
    /// Identifier of a borrow request.
    BorrowRequestId
);

uuid_id!(
    /// Identifier of an issued loan (borrow transaction).
    TransactionId
);

uuid_id!(
    /// Identifier of a return request.
    ReturnRequestId
);

uuid_id!(
    /// Identifier of a wishlist entry.
    WishlistId
);

uuid_id!(
    /// Identifier of a persisted notification.
    NotificationId
);
