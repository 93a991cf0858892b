use crate::{
    error::CaptureError,
    host::{Host, ResourceHandle, ResourceUsage, TextureFormat},
    job::{CapturedImage, PixelData},
};

pub(crate) const DEPTH_EFFECT: &str = "MultishotDepth.fx";
pub(crate) const DEPTH_TECHNIQUE: &str = "MultishotDepthCapture";
pub(crate) const DEPTH_TEXTURE: &str = "MultishotDepthTexture";

/// Grabs the frame the host currently presents as RGBA8.
pub(crate) fn read_color<H: Host + ?Sized>(host: &mut H) -> Result<CapturedImage, CaptureError> {
    let (width, height) = host.screenshot_size();
    let mut data = vec![0; width as usize * height as usize * 4];
    if !host.capture_screenshot(&mut data) {
        return Err(CaptureError::Screenshot);
    }

    Ok(CapturedImage {
        width,
        height,
        pixels: PixelData::Rgba8(data),
    })
}

/// Copies the depth texture into system memory.
///
/// Blocks until the GPU queue is idle.
pub(crate) fn read_depth<H: Host + ?Sized>(host: &mut H) -> Result<CapturedImage, CaptureError> {
    let resource = host
        .find_texture(DEPTH_EFFECT, DEPTH_TEXTURE)
        .and_then(|texture| host.texture_resource(texture))
        .ok_or(CaptureError::TextureMissing(DEPTH_TEXTURE))?;

    let desc = host.resource_desc(resource);
    if desc.format != TextureFormat::R32Float {
        return Err(CaptureError::UnsupportedFormat(desc.format));
    }

    let staging = host
        .create_staging_texture(&desc)
        .ok_or(CaptureError::StagingResource)?;
    let data = copy_through(host, resource, staging, desc.width, desc.height);
    host.destroy_resource(staging);

    Ok(CapturedImage {
        width: desc.width,
        height: desc.height,
        pixels: PixelData::R32Float(data?),
    })
}

fn copy_through<H: Host + ?Sized>(
    host: &mut H,
    source: ResourceHandle,
    staging: ResourceHandle,
    width: u32,
    height: u32,
) -> Result<Vec<f32>, CaptureError> {
    host.barrier(source, ResourceUsage::ShaderResource, ResourceUsage::CopySource);
    host.copy_texture(source, staging);
    host.barrier(source, ResourceUsage::CopySource, ResourceUsage::ShaderResource);
    host.wait_idle();

    let data = {
        let mapped = host.map_texture(staging).ok_or(CaptureError::Map)?;
        unpad_rows(mapped.data, mapped.row_pitch, width as usize * 4, height as usize)
    };
    host.unmap_texture(staging);

    let data = data.ok_or(CaptureError::Map)?;
    Ok(data
        .chunks_exact(4)
        .map(|texel| f32::from_ne_bytes([texel[0], texel[1], texel[2], texel[3]]))
        .collect())
}

/// Strips the padding the driver adds to every row of a mapped texture.
fn unpad_rows(data: &[u8], row_pitch: usize, row_bytes: usize, height: usize) -> Option<Vec<u8>> {
    if row_pitch < row_bytes || data.len() < row_pitch * height.saturating_sub(1) + row_bytes {
        return None;
    }
    if row_pitch == row_bytes {
        return Some(data[..row_bytes * height].to_vec());
    }

    Some(
        data.chunks(row_pitch)
            .take(height)
            .flat_map(|row| &row[..row_bytes])
            .copied()
            .collect(),
    )
}
