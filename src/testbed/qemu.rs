use std::path::{Path, PathBuf};

/// Guest port the forwarded host port is redirected to
pub const GUEST_SSH_PORT: u16 = 22;

const DEFAULT_MEMORY_MIB: u32 = 512;

/// QEMU machine settings for a testbed VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuConfig {
    /// Selects the `qemu-system-<arch>` binary
    pub arch: String,
    pub memory_mib: u32,
    /// Emulator path, used instead of `qemu-system-<arch>` when set
    pub binary: Option<PathBuf>,
}

impl Default for QemuConfig {
    fn default() -> Self {
        Self {
            arch: std::env::consts::ARCH.to_string(),
            memory_mib: DEFAULT_MEMORY_MIB,
            binary: None,
        }
    }
}

impl QemuConfig {
    pub fn program(&self) -> String {
        match &self.binary {
            Some(binary) => binary.to_string_lossy().into_owned(),
            None => format!("qemu-system-{}", self.arch),
        }
    }

    /// Arguments to boot `image_path` with guest SSH reachable on `ssh_port`.
    ///
    /// The disk runs in snapshot mode so the image is never modified, and
    /// the guest has no display, monitor or serial console.
    pub fn args(&self, image_path: &Path, ssh_port: u16) -> Vec<String> {
        vec![
            "-snapshot".to_string(),
            "-enable-kvm".to_string(),
            "-m".to_string(),
            self.memory_mib.to_string(),
            "-nographic".to_string(),
            "-net".to_string(),
            format!("user,hostfwd=tcp::{}-:{}", ssh_port, GUEST_SSH_PORT),
            "-net".to_string(),
            "nic,model=virtio".to_string(),
            "-drive".to_string(),
            format!("file={},if=virtio", image_path.display()),
            "-monitor".to_string(),
            "none".to_string(),
            "-serial".to_string(),
            "none".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_follows_arch() {
        let config = QemuConfig {
            arch: "aarch64".to_string(),
            ..Default::default()
        };
        assert_eq!(config.program(), "qemu-system-aarch64");
        assert_eq!(
            QemuConfig::default().program(),
            format!("qemu-system-{}", std::env::consts::ARCH)
        );

        let pinned = QemuConfig {
            binary: Some(PathBuf::from("/opt/qemu/bin/qemu-system-x86_64")),
            ..Default::default()
        };
        assert_eq!(pinned.program(), "/opt/qemu/bin/qemu-system-x86_64");
    }

    #[test]
    fn test_memory_size_is_configurable() {
        let config = QemuConfig {
            memory_mib: 2048,
            ..Default::default()
        };
        let args = config.args(Path::new("img"), 2222);
        assert_eq!(&args[2..4], ["-m", "2048"]);
    }

    #[test]
    fn test_args_forward_port_and_disable_consoles() {
        let args = QemuConfig::default().args(Path::new("/tmp/work/snappy.img"), 8022);
        let joined = args.join(" ");

        assert!(joined.starts_with("-snapshot -enable-kvm -m 512 -nographic"));
        assert!(joined.contains("-net user,hostfwd=tcp::8022-:22 -net nic,model=virtio"));
        assert!(joined.contains("-drive file=/tmp/work/snappy.img,if=virtio"));
        assert!(joined.ends_with("-monitor none -serial none"));
    }
}
