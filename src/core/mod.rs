mod router;

pub use router::{
    ChatReply, DispatchError, Router, MAX_CONTEXT_HEADER, PROVIDER_AUTH_HEADER, PROVIDER_HEADER,
};
