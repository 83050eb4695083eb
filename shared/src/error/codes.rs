//! Unified error codes for the Mercat marketplace
//!
//! This module defines all error codes used across the market server and its
//! clients. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Offer / inventory-hold errors
//! - 6xxx: Product errors
//! - 7xxx: Shop errors
//! - 8xxx: Customer errors
//! - 9xxx: System errors

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 6,
    /// Value out of range
    ValueOutOfRange = 7,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1002,
    /// Token is invalid
    TokenInvalid = 1003,
    /// Service credential missing or wrong (sweep / payment callbacks)
    ServiceCredentialInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,
    /// Caller is not the order's shopper
    NotOrderOwner = 2003,
    /// Caller is not the shop's owner
    NotShopOwner = 2004,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Requested status transition is not allowed
    InvalidTransition = 4002,
    /// Order is empty
    OrderEmpty = 4003,
    /// Rating has already been submitted
    RatingAlreadySubmitted = 4004,
    /// Presented pickup token does not match
    PickupTokenMismatch = 4005,
    /// Self-cancel grace window has elapsed
    CancelWindowElapsed = 4006,
    /// Order line not found
    OrderLineNotFound = 4007,
    /// No order line matched the reported products
    NoMatchingLines = 4008,

    // ==================== 5xxx: Offer / Hold ====================
    /// Offer not found
    OfferNotFound = 5001,
    /// Offer has expired
    OfferExpired = 5002,
    /// Not enough remaining quantity to reserve
    StockInsufficient = 5003,
    /// Hold not found
    HoldNotFound = 5004,
    /// Hold has expired
    HoldExpired = 5005,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product is out of stock
    ProductOutOfStock = 6002,
    /// Product does not belong to the shop
    ProductNotInShop = 6003,
    /// Product is snoozed
    ProductSnoozed = 6004,

    // ==================== 7xxx: Shop ====================
    /// Shop not found
    ShopNotFound = 7001,
    /// Shop is closed or paused
    ShopClosed = 7002,

    // ==================== 8xxx: Customer ====================
    /// Customer number not assigned yet
    CustomerNumberMissing = 8001,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",
            ErrorCode::ServiceCredentialInvalid => "Service credential is missing or invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "Specific role is required",
            ErrorCode::NotOrderOwner => "Caller is not the order's shopper",
            ErrorCode::NotShopOwner => "Caller is not the shop's owner",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InvalidTransition => "Status transition is not allowed",
            ErrorCode::OrderEmpty => "Order has no available lines",
            ErrorCode::RatingAlreadySubmitted => "Order has already been rated",
            ErrorCode::PickupTokenMismatch => "Pickup token does not match",
            ErrorCode::CancelWindowElapsed => "Self-cancel window has elapsed",
            ErrorCode::OrderLineNotFound => "Order line not found",
            ErrorCode::NoMatchingLines => "No order line matched the reported products",

            // Offer / Hold
            ErrorCode::OfferNotFound => "Offer not found",
            ErrorCode::OfferExpired => "Offer has expired",
            ErrorCode::StockInsufficient => "Not enough remaining quantity",
            ErrorCode::HoldNotFound => "Hold not found",
            ErrorCode::HoldExpired => "Hold has expired",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductOutOfStock => "Product is out of stock",
            ErrorCode::ProductNotInShop => "Product does not belong to this shop",
            ErrorCode::ProductSnoozed => "Product is temporarily unavailable",

            // Shop
            ErrorCode::ShopNotFound => "Shop not found",
            ErrorCode::ShopClosed => "Shop is closed",

            // Customer
            ErrorCode::CustomerNumberMissing => "Customer number has not been assigned",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigError => "Configuration error",
        }
    }

    /// Get the HTTP status code for this error
    pub const fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::Success => StatusCode::OK,

            ErrorCode::NotAuthenticated
            | ErrorCode::TokenExpired
            | ErrorCode::TokenInvalid
            | ErrorCode::ServiceCredentialInvalid => StatusCode::UNAUTHORIZED,

            ErrorCode::PermissionDenied
            | ErrorCode::RoleRequired
            | ErrorCode::NotOrderOwner
            | ErrorCode::NotShopOwner => StatusCode::FORBIDDEN,

            ErrorCode::NotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::OrderLineNotFound
            | ErrorCode::OfferNotFound
            | ErrorCode::HoldNotFound
            | ErrorCode::ProductNotFound
            | ErrorCode::ShopNotFound
            | ErrorCode::CustomerNumberMissing => StatusCode::NOT_FOUND,

            ErrorCode::AlreadyExists | ErrorCode::RatingAlreadySubmitted => StatusCode::CONFLICT,

            ErrorCode::InvalidTransition
            | ErrorCode::OrderEmpty
            | ErrorCode::PickupTokenMismatch
            | ErrorCode::CancelWindowElapsed
            | ErrorCode::NoMatchingLines
            | ErrorCode::ProductOutOfStock
            | ErrorCode::ProductNotInShop
            | ErrorCode::ProductSnoozed
            | ErrorCode::ShopClosed => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::OfferExpired
            | ErrorCode::StockInsufficient
            | ErrorCode::HoldExpired => StatusCode::CONFLICT,

            ErrorCode::ValidationFailed
            | ErrorCode::Unknown
            | ErrorCode::InvalidRequest
            | ErrorCode::RequiredField
            | ErrorCode::ValueOutOfRange => StatusCode::BAD_REQUEST,

            ErrorCode::InternalError | ErrorCode::DatabaseError | ErrorCode::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::RequiredField),
            7 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::TokenExpired),
            1003 => Ok(ErrorCode::TokenInvalid),
            1004 => Ok(ErrorCode::ServiceCredentialInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::RoleRequired),
            2003 => Ok(ErrorCode::NotOrderOwner),
            2004 => Ok(ErrorCode::NotShopOwner),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::InvalidTransition),
            4003 => Ok(ErrorCode::OrderEmpty),
            4004 => Ok(ErrorCode::RatingAlreadySubmitted),
            4005 => Ok(ErrorCode::PickupTokenMismatch),
            4006 => Ok(ErrorCode::CancelWindowElapsed),
            4007 => Ok(ErrorCode::OrderLineNotFound),
            4008 => Ok(ErrorCode::NoMatchingLines),

            // Offer / Hold
            5001 => Ok(ErrorCode::OfferNotFound),
            5002 => Ok(ErrorCode::OfferExpired),
            5003 => Ok(ErrorCode::StockInsufficient),
            5004 => Ok(ErrorCode::HoldNotFound),
            5005 => Ok(ErrorCode::HoldExpired),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductOutOfStock),
            6003 => Ok(ErrorCode::ProductNotInShop),
            6004 => Ok(ErrorCode::ProductSnoozed),

            // Shop
            7001 => Ok(ErrorCode::ShopNotFound),
            7002 => Ok(ErrorCode::ShopClosed),

            // Customer
            8001 => Ok(ErrorCode::CustomerNumberMissing),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::ConfigError),

            other => Err(InvalidErrorCode(other)),
        }
    }
}
