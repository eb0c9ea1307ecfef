use super::*;

/// Builds the configuration from `cool-socket.toml` (if it exists) and the given command line
/// arguments, the first of which is the program name
pub fn build_config(args: Vec<String>) -> Result<MasterConfig, Box<dyn Error>> {
    build_config_with(real_filesystem(), args)
}

pub fn build_config_with(fs: Filesystem, args: Vec<String>) -> Result<MasterConfig, Box<dyn Error>> {
    // TODO: accumulate multiple config errors instead of stopping at the first
    let mut builder = ConfigBuilder::new(config_entries());
    if fs.is_file(DEFAULT_TOML_PATH) {
        load_toml(DEFAULT_TOML_PATH, &mut builder, &fs)?;
    }
    let mut conf = MasterConfig::default();
    if parse_args(&mut builder, args)? == ArgsOutcome::Help {
        conf.happy_exit = true;
        conf.help = Some(builder.help_text());
        return Ok(conf);
    }
    builder.apply_to(&mut conf)?;
    if let Some(tls) = &conf.net.tls {
        check_tls(&fs, tls)?;
    }
    conf.rtc.default_signaling_url = conf.net.signaling_url();
    Ok(conf)
}

fn check_tls(fs: &Filesystem, tls: &TlsMaterial) -> Result<(), Box<dyn Error>> {
    for (what, path) in [("tls_key_path", &tls.key_path), ("tls_cert_path", &tls.cert_path)] {
        if path.is_empty() {
            return Err(format!("secure is set but {} is empty", what).into());
        }
        if !fs.is_file(path) {
            return Err(format!("{} {} is not a file", what, path).into());
        }
    }
    Ok(())
}
