#![no_main]

use libfuzzer_sys::fuzz_target;
use wirecall::utils::crypto::Crypto;

fuzz_target!(|data: &[u8]| {
    // First byte picks the salt length, the rest is the client's challenge
    let Some((&salt_len, rest)) = data.split_first() else {
        return;
    };
    let salt_len = (salt_len as usize % 16).min(rest.len());
    let (salt, challenge) = rest.split_at(salt_len);

    let crypto = Crypto::from_salt_and_secret(salt, b"fuzz-secret");
    if let Ok(plain) = crypto.open(challenge) {
        let sealed = crypto.seal(&plain).expect("seal after open");
        assert_eq!(crypto.open(&sealed).expect("open own seal"), plain);
    }
});
