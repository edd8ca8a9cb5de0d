#[cfg(windows)]
fn main() {
    if let Err(err) = compile_windows_resources() {
        panic!("failed to compile AppTally resources: {err}");
    }
}

#[cfg(not(windows))]
fn main() {}

#[cfg(windows)]
fn compile_windows_resources() -> Result<(), Box<dyn std::error::Error>> {
    let mut res = winres::WindowsResource::new();
    res.set("ProductName", "AppTally");
    res.set("FileDescription", "AppTally application usage tracker");
    res.set("OriginalFilename", "apptally.exe");
    res.set("InternalName", "apptally.exe");
    res.compile()?;
    Ok(())
}
