mod auth;

pub use auth::{
    ADMIN_KEY_HEADER, AdminAccess, AuthenticatedUser, JwtPayload, SendAuthority, decode_jwt,
};
