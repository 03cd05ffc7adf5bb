/// A fixed-width, totally-ordered key. `K` is typically a 4-byte unsigned
/// integer, but the trait makes no assumption beyond a fixed encoded width
/// and a total order.
pub trait Key: Copy + Ord + std::fmt::Debug + 'static {
    /// Number of bytes this key occupies on a page.
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_key_for_uint {
    ($t:ty) => {
        impl Key for $t {
            const ENCODED_SIZE: usize = std::mem::size_of::<$t>();

            fn encode(&self, buf: &mut [u8]) {
                buf[..Self::ENCODED_SIZE].copy_from_slice(&self.to_le_bytes());
            }

            fn decode(buf: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                bytes.copy_from_slice(&buf[..Self::ENCODED_SIZE]);
                <$t>::from_le_bytes(bytes)
            }
        }
    };
}

impl_key_for_uint!(u16);
impl_key_for_uint!(u32);
impl_key_for_uint!(u64);
