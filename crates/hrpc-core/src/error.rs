//! Error classification shared by the client and server.
//!
//! Every fallible protocol operation produces an [`HrpcError`] tagged with
//! an [`ErrorKind`]: the kind alone determines the wire status code on the
//! server side and whether the client-side retry loop block-lists the
//! current target.

use core::fmt;
use core::panic::Location;
use std::error::Error as StdError;

use http::StatusCode;

/// Everything that can go wrong with a protocol operation, collapsed to the
/// distinctions the wire and the retry loop actually care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadContentType,
    ProtocolViolation,
    NoSuchEjb,
    NoSuchMethod,
    WrongViewType,
    SessionNotActive,
    NotStateful,
    NameNotFound,
    GenericApplicationException,
    TxEnlistmentFailure,
    ClassFiltered,
    CommunicationFailure,
    UnexpectedDataInResponse,
    NoSessionId,
    Interruption,
}

impl ErrorKind {
    /// The HTTP status a server response uses to signal this error kind.
    ///
    /// `CommunicationFailure`, `UnexpectedDataInResponse`, and `NoSessionId`
    /// never cross the wire as a server-produced status: they are raised
    /// client-side when the peer cannot be reached or its response is
    /// malformed.
    pub const fn status_code(self) -> Option<StatusCode> {
        match self {
            Self::BadContentType | Self::ProtocolViolation => Some(StatusCode::BAD_REQUEST),
            Self::NoSuchEjb | Self::NoSuchMethod | Self::WrongViewType | Self::NameNotFound => {
                Some(StatusCode::NOT_FOUND)
            }
            Self::SessionNotActive
            | Self::NotStateful
            | Self::GenericApplicationException
            | Self::TxEnlistmentFailure
            | Self::ClassFiltered => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::CommunicationFailure | Self::UnexpectedDataInResponse | Self::NoSessionId | Self::Interruption => {
                None
            }
        }
    }

    /// Whether this error drives the retry loop's block-list: only
    /// communication failures do. Every other kind is a legitimate
    /// application error and should eagerly un-block-list the destination
    /// it came from.
    pub const fn drives_block_list(self) -> bool {
        matches!(self, Self::CommunicationFailure)
    }

    /// Stable wire name, carried as the exception body's class name so a
    /// peer can reconstruct the kind without guessing from the HTTP status
    /// alone (several kinds share a status code).
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::BadContentType => "BadContentType",
            Self::ProtocolViolation => "ProtocolViolation",
            Self::NoSuchEjb => "NoSuchEJB",
            Self::NoSuchMethod => "NoSuchMethod",
            Self::WrongViewType => "WrongViewType",
            Self::SessionNotActive => "SessionNotActive",
            Self::NotStateful => "NotStateful",
            Self::NameNotFound => "NameNotFound",
            Self::GenericApplicationException => "GenericApplicationException",
            Self::TxEnlistmentFailure => "TxEnlistmentFailure",
            Self::ClassFiltered => "ClassFiltered",
            Self::CommunicationFailure => "CommunicationFailure",
            Self::UnexpectedDataInResponse => "UnexpectedDataInResponse",
            Self::NoSessionId => "NoSessionId",
            Self::Interruption => "Interruption",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Some(match name {
            "BadContentType" => Self::BadContentType,
            "ProtocolViolation" => Self::ProtocolViolation,
            "NoSuchEJB" => Self::NoSuchEjb,
            "NoSuchMethod" => Self::NoSuchMethod,
            "WrongViewType" => Self::WrongViewType,
            "SessionNotActive" => Self::SessionNotActive,
            "NotStateful" => Self::NotStateful,
            "NameNotFound" => Self::NameNotFound,
            "GenericApplicationException" => Self::GenericApplicationException,
            "TxEnlistmentFailure" => Self::TxEnlistmentFailure,
            "ClassFiltered" => Self::ClassFiltered,
            "CommunicationFailure" => Self::CommunicationFailure,
            "UnexpectedDataInResponse" => Self::UnexpectedDataInResponse,
            "NoSessionId" => Self::NoSessionId,
            "Interruption" => Self::Interruption,
            _ => return None,
        })
    }
}

/// Staged construction mirroring the call site that raised the error,
/// so a later `Display` can report both the kind and where it originated.
pub struct HrpcErrorBuilder {
    kind: ErrorKind,
    loc: &'static Location<'static>,
}

impl HrpcErrorBuilder {
    #[track_caller]
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            loc: Location::caller(),
        }
    }

    pub fn msg(self, msg: impl Into<String>) -> HrpcError {
        HrpcError {
            kind: self.kind,
            loc: self.loc,
            msg: msg.into(),
            source: None,
        }
    }

    pub fn err<T>(self, msg: impl Into<String>) -> impl FnOnce(T) -> HrpcError
    where
        T: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        let msg = msg.into();
        move |source| HrpcError {
            kind: self.kind,
            loc: self.loc,
            msg,
            source: Some(source.into()),
        }
    }
}

#[derive(Debug)]
pub struct HrpcError {
    pub kind: ErrorKind,
    pub loc: &'static Location<'static>,
    pub msg: String,
    pub source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

macro_rules! ctor {
    ($name:ident, $kind:expr) => {
        #[track_caller]
        pub fn $name() -> HrpcErrorBuilder {
            HrpcErrorBuilder::new($kind)
        }
    };
}

impl HrpcError {
    ctor!(bad_content_type, ErrorKind::BadContentType);
    ctor!(protocol_violation, ErrorKind::ProtocolViolation);
    ctor!(no_such_ejb, ErrorKind::NoSuchEjb);
    ctor!(no_such_method, ErrorKind::NoSuchMethod);
    ctor!(wrong_view_type, ErrorKind::WrongViewType);
    ctor!(session_not_active, ErrorKind::SessionNotActive);
    ctor!(not_stateful, ErrorKind::NotStateful);
    ctor!(name_not_found, ErrorKind::NameNotFound);
    ctor!(generic_application, ErrorKind::GenericApplicationException);
    ctor!(tx_enlistment_failure, ErrorKind::TxEnlistmentFailure);
    ctor!(class_filtered, ErrorKind::ClassFiltered);
    ctor!(communication_failure, ErrorKind::CommunicationFailure);
    ctor!(unexpected_data_in_response, ErrorKind::UnexpectedDataInResponse);
    ctor!(no_session_id, ErrorKind::NoSessionId);
    ctor!(interruption, ErrorKind::Interruption);

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Reconstructs an error from a decoded exception body, where no call
    /// site `Location` is available.
    #[track_caller]
    pub fn new_from_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        HrpcErrorBuilder::new(kind).msg(msg)
    }
}

impl fmt::Display for HrpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}: {}", self.kind, self.loc, self.msg)?;

        if let Some(source) = self.source.as_deref() {
            write!(f, " [source: {source}")?;
            let mut cause = source.source();
            while let Some(c) = cause {
                write!(f, ", because {c}")?;
                cause = c.source();
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

impl StdError for HrpcError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
    }
}
