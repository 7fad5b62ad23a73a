/// Which side of the connection a codec is working for.
///
/// Clients must mask every frame they send and servers must never mask theirs, so the
/// decoder and writer are generic over the role instead of checking at runtime.
pub trait RolePolicy: Send + Sync + 'static {
    /// Incoming frames must carry a masking key.
    const EXPECT_MASKED: bool;
    /// Outgoing frames get a fresh random masking key.
    const MASK_OUTGOING: bool;
    /// Short tag used in log lines.
    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct Server;

#[derive(Debug, Clone, Copy)]
pub struct Client;

impl RolePolicy for Server {
    const EXPECT_MASKED: bool = true;
    const MASK_OUTGOING: bool = false;
    const NAME: &'static str = "SRV";
}

impl RolePolicy for Client {
    const EXPECT_MASKED: bool = false;
    const MASK_OUTGOING: bool = true;
    const NAME: &'static str = "CLI";
}
