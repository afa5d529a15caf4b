//! Random credentials for new mailboxes

use rand::Rng;
use rand::distributions::Alphanumeric;

const LOCAL_PART_LEN: usize = 10;
const PASSWORD_LEN: usize = 16;

/// Appended so the password always contains a symbol
const PASSWORD_SUFFIX: char = '!';

const LOCAL_PART_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Lowercase alphanumeric local part
pub fn random_local_part() -> String {
    let mut rng = rand::thread_rng();
    (0..LOCAL_PART_LEN)
        .map(|_| LOCAL_PART_CHARSET[rng.gen_range(0..LOCAL_PART_CHARSET.len())] as char)
        .collect()
}

pub fn random_password() -> String {
    let mut password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect();
    password.push(PASSWORD_SUFFIX);
    password
}
