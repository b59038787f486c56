// 로깅 초기화 - env_logger (RUST_LOG 우선, 기본 info)

/// 1회만 초기화. 이미 초기화되어 있으면 false
pub fn init() -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    #[test]
    fn second_init_is_harmless() {
        super::init();
        assert!(!super::init());
    }
}
