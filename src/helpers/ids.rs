use rand::Rng;

const CALL_ID_LEN: usize = 10;

/// Short random hex id, used as the correlation id of outgoing calls
pub fn random_call_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CALL_ID_LEN)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}

pub fn random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
