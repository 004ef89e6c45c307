use crate::coords::SurfaceSize;

use super::SurfaceErrorAction;

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let first = *caps.formats.first()?;

    let preferred: &[wgpu::TextureFormat] = if prefer_srgb {
        &[
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ]
    } else {
        &[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm]
    };

    preferred
        .iter()
        .copied()
        .find(|f| caps.formats.contains(f))
        .or(Some(first))
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Applies `new_size` to `config`. Returns `false` for a zero size, which
/// wgpu cannot configure; the caller keeps the previous configuration.
pub(crate) fn apply_size(config: &mut wgpu::SurfaceConfiguration, new_size: SurfaceSize) -> bool {
    if new_size.is_empty() {
        return false;
    }
    config.width = new_size.width;
    config.height = new_size.height;
    true
}

/// Maps a surface error to the frame loop's response. `Reconfigured` means
/// the caller must configure the surface again.
pub(crate) fn error_action(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>, alpha: Vec<wgpu::CompositeAlphaMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes: alpha,
            ..Default::default()
        }
    }

    #[test]
    fn linear_format_preferred_unless_srgb_requested() {
        use wgpu::TextureFormat::*;
        let c = caps(vec![Bgra8UnormSrgb, Bgra8Unorm], vec![]);
        assert_eq!(choose_surface_format(&c, false), Some(Bgra8Unorm));
        assert_eq!(choose_surface_format(&c, true), Some(Bgra8UnormSrgb));
    }

    #[test]
    fn falls_back_to_first_format() {
        use wgpu::TextureFormat::*;
        let c = caps(vec![Rgba16Float], vec![]);
        assert_eq!(choose_surface_format(&c, false), Some(Rgba16Float));
        assert_eq!(choose_surface_format(&caps(vec![], vec![]), false), None);
    }

    #[test]
    fn unsupported_alpha_mode_is_replaced() {
        use wgpu::CompositeAlphaMode::*;
        let c = caps(vec![], vec![Opaque, PreMultiplied]);
        assert_eq!(choose_alpha_mode(&c, Some(PreMultiplied)), PreMultiplied);
        assert_eq!(choose_alpha_mode(&c, Some(PostMultiplied)), Opaque);
        assert_eq!(choose_alpha_mode(&caps(vec![], vec![]), None), Auto);
    }

    #[test]
    fn zero_size_is_not_applied() {
        let mut config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: wgpu::TextureFormat::Bgra8Unorm,
            width: 640,
            height: 480,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        assert!(!apply_size(&mut config, SurfaceSize::new(0, 100)));
        assert_eq!((config.width, config.height), (640, 480));
        assert!(apply_size(&mut config, SurfaceSize::new(800, 600)));
        assert_eq!((config.width, config.height), (800, 600));
    }

    #[test]
    fn surface_errors_map_to_actions() {
        assert_eq!(error_action(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigured);
        assert_eq!(error_action(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(error_action(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }
}
