//! Application shell and event loop.
//!
//! The viewer loads one variant-tagged glTF asset, renders it to the window
//! (a browser canvas on the web target) and switches material variants on
//! keyboard input: left/right arrows cycle through the catalogue, digit keys
//! jump to an entry directly.
//!
//! Asset loading and material resolution are async. On native targets they
//! block on a tokio runtime; on wasm they run as detached futures whose
//! results come back into the loop as [`ViewerEvent`]s through the event-loop
//! proxy. A resolved material is committed only if its selection generation
//! is still current, so mashing the selection keys can never interleave two
//! variants.

use std::iter;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::Window;

use crate::assets::{self, MaterialStore};
use crate::context::{CLEAR_COLOUR, Context};
use crate::scene::{MaterialHandle, MeshId, SceneNode};
use crate::variants::VariantSelector;

#[cfg(not(target_arch = "wasm32"))]
use crate::variants::apply_plan;
#[cfg(target_arch = "wasm32")]
use crate::variants::ResolveMaterial;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub enum ViewerEvent {
    /// Async initialization finished (wasm only).
    Initialized(Box<AppState>),
    /// Async initialization failed (wasm only).
    LoadFailed(String),
    /// A detached material resolution finished (wasm only).
    MaterialReady {
        mesh: MeshId,
        material: MaterialHandle,
        generation: u64,
    },
}

pub struct AppState {
    ctx: Context,
    root: Box<dyn SceneNode>,
    selector: VariantSelector,
    materials: MaterialStore,
    active_variant: Option<usize>,
    is_surface_configured: bool,
}

impl AppState {
    async fn new(window: Arc<Window>, file_name: &str) -> anyhow::Result<Self> {
        let ctx = Context::new(window).await?;
        let scene = assets::load_scene(file_name, &ctx.device, &ctx.queue).await?;

        Ok(Self {
            ctx,
            root: scene.root,
            selector: scene.selector,
            materials: scene.materials,
            active_variant: None,
            is_surface_configured: false,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.is_surface_configured = true;
            self.ctx.resize(width, height);
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Render Encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOUR),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.ctx.pipelines.basic);
            let materials = self.materials.materials();
            self.root.draw(
                &materials,
                &self.ctx.camera.bind_group,
                &self.ctx.light.bind_group,
                &mut render_pass,
            );
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    state: Option<AppState>,
    file_name: String,
}

impl App {
    fn new(event_loop: &EventLoop<ViewerEvent>, file_name: &str) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            state: None,
            file_name: file_name.to_string(),
        })
    }

    /// Switch to the catalogue entry at `index`.
    ///
    /// The synchronous phase restores every unmatched mesh immediately; the
    /// matched meshes get their materials resolved asynchronously and applied
    /// as the resolutions land.
    fn select_variant(&mut self, index: usize) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let Some(name) = state.selector.catalog().names().get(index).cloned() else {
            return;
        };
        log::info!("selecting variant '{name}'");
        state.active_variant = Some(index);

        let plan = state.selector.select(state.root.as_mut(), &name);

        #[cfg(not(target_arch = "wasm32"))]
        {
            let applied = self.async_runtime.block_on(apply_plan(
                &state.selector,
                state.root.as_mut(),
                &state.materials,
                plan,
            ));
            log::info!("variant '{name}' applied to {applied} meshes");
        }

        #[cfg(target_arch = "wasm32")]
        {
            let generation = plan.generation;
            for swap in plan.pending {
                let materials = state.materials.clone();
                let proxy = self.proxy.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    match materials.resolve(swap.material).await {
                        Ok(material) => {
                            let _ = proxy.send_event(ViewerEvent::MaterialReady {
                                mesh: swap.mesh,
                                material,
                                generation,
                            });
                        }
                        Err(error) => {
                            log::error!("material update for mesh {} failed: {error}", swap.mesh);
                        }
                    }
                });
            }
        }

        state.ctx.window.request_redraw();
    }

    fn cycle_variant(&mut self, step: isize) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let len = state.selector.catalog().len() as isize;
        if len == 0 {
            return;
        }
        let current = state.active_variant.unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(len) as usize;
        self.select_variant(next);
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("matswap");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                log::error!("could not create a window: {error}");
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self
                .async_runtime
                .block_on(AppState::new(window, &self.file_name))
            {
                Ok(state) => {
                    self.state = Some(state);
                    // The original asset comes up in its first variant.
                    self.select_variant(0);
                }
                Err(error) => {
                    log::error!("viewer initialization failed: {error:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            let file_name = self.file_name.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = match AppState::new(window, &file_name).await {
                    Ok(state) => ViewerEvent::Initialized(Box::new(state)),
                    Err(error) => ViewerEvent::LoadFailed(format!("{error:#}")),
                };
                let _ = proxy.send_event(event);
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Initialized(state) => {
                // This is the message from our wasm `spawn_local`
                self.state = Some(*state);
                if let Some(state) = self.state.as_mut() {
                    let size = state.ctx.window.inner_size();
                    state.resize(size.width, size.height);
                }
                self.select_variant(0);
            }
            ViewerEvent::LoadFailed(message) => {
                log::error!("viewer initialization failed: {message}");
                event_loop.exit();
            }
            ViewerEvent::MaterialReady {
                mesh,
                material,
                generation,
            } => {
                if let Some(state) = self.state.as_mut() {
                    if state
                        .selector
                        .commit(state.root.as_mut(), mesh, material, generation)
                    {
                        state.ctx.window.request_redraw();
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        if state.ctx.camera.controller.handle_window_events(&event) {
            let projection = &state.ctx.projection;
            state.ctx.camera.update(&state.ctx.queue, projection);
            state.ctx.window.request_redraw();
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                state.ctx.window.request_redraw();
            }
            WindowEvent::RedrawRequested => match state.render() {
                Ok(()) => {}
                // Reconfigure the surface if it's lost or outdated
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    let size = state.ctx.window.inner_size();
                    state.resize(size.width, size.height);
                }
                Err(error) => {
                    log::error!("Unable to render {error}");
                }
            },
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::ArrowRight => self.cycle_variant(1),
                KeyCode::ArrowLeft => self.cycle_variant(-1),
                KeyCode::Escape => event_loop.exit(),
                code => {
                    if let Some(index) = digit_index(code) {
                        self.select_variant(index);
                    }
                }
            },
            _ => {}
        }
    }
}

fn digit_index(code: KeyCode) -> Option<usize> {
    match code {
        KeyCode::Digit1 => Some(0),
        KeyCode::Digit2 => Some(1),
        KeyCode::Digit3 => Some(2),
        KeyCode::Digit4 => Some(3),
        KeyCode::Digit5 => Some(4),
        KeyCode::Digit6 => Some(5),
        KeyCode::Digit7 => Some(6),
        KeyCode::Digit8 => Some(7),
        KeyCode::Digit9 => Some(8),
        _ => None,
    }
}

pub fn run(file_name: &str) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, file_name)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    run("MaterialChange.gltf").map_err(|error| JsValue::from_str(&format!("{error:#}")))
}
