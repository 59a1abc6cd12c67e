use rand::RngCore;

/// Alphabet without the ambiguous characters 0, O, 1 and I.
/// Its length (32) divides 256, so `byte % 32` is unbiased.
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_PREFIX: &str = "PAY-";
const FIRST_GROUP_LEN: usize = 8;
const SECOND_GROUP_LEN: usize = 4;

/// Generate a bearer activation code of the form `PAY-XXXXXXXX-XXXX`.
///
/// Uses the OS CSPRNG; every symbol is independent, so codes carry
/// 60 bits of entropy and no sequential structure.
pub fn generate_activation_code() -> String {
    let mut bytes = [0u8; FIRST_GROUP_LEN + SECOND_GROUP_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let mut code = String::with_capacity(CODE_PREFIX.len() + bytes.len() + 1);
    code.push_str(CODE_PREFIX);
    for (i, byte) in bytes.iter().enumerate() {
        if i == FIRST_GROUP_LEN {
            code.push('-');
        }
        code.push(CODE_ALPHABET[usize::from(*byte) % CODE_ALPHABET.len()] as char);
    }
    code
}
