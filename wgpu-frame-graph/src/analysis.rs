use crate::backend::Backend;
use crate::pass::PassEntry;
use crate::resource::{Access, ResourceRegistry};

/// Marks dead passes and computes transient lifetimes.
///
/// Returns the number of culled passes. Lifetimes only span passes that
/// survive culling.
pub(crate) fn analyze<'a, B: Backend>(
    resources: &mut ResourceRegistry<'a, B::Texture>,
    passes: &mut [PassEntry<'a, B>],
) -> usize {
    for resource in resources.iter_mut() {
        resource.used = false;
        resource.read = false;
        resource.required = false;
        resource.first_use = None;
        resource.last_use = None;
    }

    for pass in passes.iter() {
        for usage in &pass.usages {
            if let Some(resource) = resources.get_mut(usage.handle) {
                resource.used = true;
                if usage.access == Access::Read {
                    resource.read = true;
                }
            }
        }
    }

    for resource in resources.iter_mut() {
        resource.required = resource.read || (resource.is_external() && resource.used);
    }

    let mut culled = 0;
    for pass in passes.iter_mut().rev() {
        let required = pass.keep_alive
            || pass.usages.iter().any(|usage| {
                resources
                    .get(usage.handle)
                    .is_some_and(|resource| resource.required)
            });

        pass.culled = !required;
        if !required {
            culled += 1;
            continue;
        }

        for usage in &pass.usages {
            if let Some(resource) = resources.get_mut(usage.handle) {
                resource.required = true;
            }
        }
    }

    for (index, pass) in passes.iter().enumerate() {
        if pass.culled {
            continue;
        }

        for usage in &pass.usages {
            if let Some(resource) = resources.get_mut(usage.handle) {
                resource.first_use.get_or_insert(index);
                resource.last_use = Some(index);
            }
        }
    }

    culled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{PassBuilder, PassContext, RenderPass};
    use crate::resource::{ResourceState, ResourceUsage, TextureDesc, TextureHandle};
    use crate::testing::CountingBackend;
    use wgpu::TextureFormat;

    struct Noop;

    impl RenderPass<CountingBackend> for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn setup(&mut self, _builder: &mut PassBuilder<'_, '_, CountingBackend>) {}

        fn execute(&mut self, _context: &mut PassContext<'_, '_, CountingBackend>) {}
    }

    fn entry<'a>(
        name: &str,
        usages: &[(TextureHandle, Access)],
        keep_alive: bool,
    ) -> PassEntry<'a, CountingBackend> {
        let usages = usages
            .iter()
            .map(|&(handle, access)| ResourceUsage {
                handle,
                state: match access {
                    Access::Read => ResourceState::ShaderResource,
                    Access::Write => ResourceState::RenderTarget,
                },
                access,
            })
            .collect();
        PassEntry::new(name.to_string(), Box::new(Noop), usages, keep_alive)
    }

    fn desc() -> TextureDesc {
        TextureDesc::new(32, 32, TextureFormat::Rgba8Unorm)
    }

    #[test]
    fn write_only_pass_is_culled() {
        let mut resources = ResourceRegistry::<u32>::new();
        let orphan = resources.register_texture("orphan", desc());
        let mut passes = vec![entry("debug", &[(orphan, Access::Write)], false)];

        assert_eq!(analyze(&mut resources, &mut passes), 1);
        assert!(passes[0].culled);
        assert!(!resources.get(orphan).unwrap().is_required());
        assert_eq!(resources.get(orphan).unwrap().first_use(), None);
    }

    #[test]
    fn producers_of_read_resources_are_kept() {
        let mut resources = ResourceRegistry::<u32>::new();
        let shadow = resources.register_texture("shadow", desc());
        let mut passes = vec![
            entry("shadow", &[(shadow, Access::Write)], false),
            entry("lighting", &[(shadow, Access::Read)], false),
        ];

        assert_eq!(analyze(&mut resources, &mut passes), 0);
        let shadow = resources.get(shadow).unwrap();
        assert_eq!(shadow.first_use(), Some(0));
        assert_eq!(shadow.last_use(), Some(1));
    }

    #[test]
    fn writes_to_external_resources_are_outputs() {
        let back_buffer = 0u32;
        let mut state = ResourceState::Present;
        let mut resources = ResourceRegistry::<u32>::new();
        let hdr = resources.register_texture("hdr", desc());
        let output = resources.import_texture("back_buffer", &back_buffer, &mut state, desc());
        let mut passes = vec![
            entry("scene", &[(hdr, Access::Write)], false),
            entry("tonemap", &[(output, Access::Write)], false),
        ];

        analyze(&mut resources, &mut passes);
        assert!(passes[0].culled);
        assert!(!passes[1].culled);
    }

    #[test]
    fn required_passes_pull_in_their_writes() {
        let mut resources = ResourceRegistry::<u32>::new();
        let gbuffer = resources.register_texture("gbuffer", desc());
        let lit = resources.register_texture("lit", desc());
        let mut passes = vec![
            entry("geometry", &[(gbuffer, Access::Write)], false),
            entry(
                "lighting",
                &[(gbuffer, Access::Read), (lit, Access::Write)],
                false,
            ),
            entry("present", &[(lit, Access::Read)], false),
        ];

        assert_eq!(analyze(&mut resources, &mut passes), 0);
        assert_eq!(resources.get(lit).unwrap().first_use(), Some(1));
        assert_eq!(resources.get(lit).unwrap().last_use(), Some(2));
    }

    #[test]
    fn keep_alive_survives_without_consumers() {
        let mut resources = ResourceRegistry::<u32>::new();
        let scratch = resources.register_texture("scratch", desc());
        let mut passes = vec![
            entry("gpu_culling", &[(scratch, Access::Write)], true),
            entry("no_outputs", &[], false),
        ];

        assert_eq!(analyze(&mut resources, &mut passes), 1);
        assert!(!passes[0].culled);
        assert!(passes[1].culled);
        assert_eq!(resources.get(scratch).unwrap().last_use(), Some(0));
    }

    #[test]
    fn culled_passes_do_not_extend_lifetimes() {
        let mut resources = ResourceRegistry::<u32>::new();
        let color = resources.register_texture("color", desc());
        let unused = resources.register_texture("unused", desc());
        let mut passes = vec![
            entry("producer", &[(color, Access::Write)], false),
            entry("consumer", &[(color, Access::Read)], false),
            entry(
                "late_writer",
                &[(color, Access::Write), (unused, Access::Write)],
                false,
            ),
        ];

        analyze(&mut resources, &mut passes);
        // `color` is read, so the late writer touches a required resource.
        assert!(!passes[2].culled);
        assert_eq!(resources.get(color).unwrap().last_use(), Some(2));

        let mut passes = vec![
            entry("producer", &[(color, Access::Write)], false),
            entry("consumer", &[(color, Access::Read)], false),
            entry("orphan", &[(unused, Access::Write)], false),
        ];
        analyze(&mut resources, &mut passes);
        assert!(passes[2].culled);
        assert_eq!(resources.get(color).unwrap().last_use(), Some(1));
        assert_eq!(resources.get(unused).unwrap().last_use(), None);
    }

    #[test]
    fn invalid_handles_are_ignored() {
        let mut resources = ResourceRegistry::<u32>::new();
        let mut passes = vec![entry(
            "broken",
            &[(TextureHandle::INVALID, Access::Read)],
            false,
        )];

        assert_eq!(analyze(&mut resources, &mut passes), 1);
    }
}
