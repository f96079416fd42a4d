//! ACADOS FFI bindings for the tilt-rotor NMPC solver
//!
//! Raw C bindings to the generated `tilt_qd_servo` solver, wrapped by
//! [`AcadosCapsule`]. Used by `AcadosSolver` in solver.rs.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]

use std::os::raw::{c_char, c_double, c_int, c_void};

/// ACADOS dimension constants from generated code
pub const NX: usize = 17;  // p(3) v(3) q(4) w(3) a(4)
pub const NU: usize = 8;   // ft(4) ac(4)
pub const NP: usize = 14;  // q_ref(4) f_dist_w(3) tau_dist_b(3) drag(4)
pub const N: usize = 20;   // Horizon length
pub const NY: usize = 25;  // Stage cost output: state + control
pub const NYN: usize = 17; // Terminal cost output: state

// Opaque types from ACADOS
#[repr(C)]
pub struct ocp_nlp_in { _private: [u8; 0] }

#[repr(C)]
pub struct ocp_nlp_out { _private: [u8; 0] }

#[repr(C)]
pub struct ocp_nlp_solver { _private: [u8; 0] }

#[repr(C)]
pub struct ocp_nlp_config { _private: [u8; 0] }

#[repr(C)]
pub struct ocp_nlp_dims { _private: [u8; 0] }

/// Solver capsule - opaque handle to the generated solver
#[repr(C)]
pub struct tilt_qd_servo_solver_capsule {
    _private: [u8; 0],
}

extern "C" {
    pub fn tilt_qd_servo_acados_create_capsule() -> *mut tilt_qd_servo_solver_capsule;
    pub fn tilt_qd_servo_acados_free_capsule(capsule: *mut tilt_qd_servo_solver_capsule) -> c_int;

    pub fn tilt_qd_servo_acados_create_with_discretization(
        capsule: *mut tilt_qd_servo_solver_capsule,
        n_time_steps: c_int,
        new_time_steps: *const c_double,
    ) -> c_int;
    pub fn tilt_qd_servo_acados_reset(
        capsule: *mut tilt_qd_servo_solver_capsule,
        reset_qp_solver_mem: c_int,
    ) -> c_int;
    pub fn tilt_qd_servo_acados_free(capsule: *mut tilt_qd_servo_solver_capsule) -> c_int;

    pub fn tilt_qd_servo_acados_solve(capsule: *mut tilt_qd_servo_solver_capsule) -> c_int;

    pub fn tilt_qd_servo_acados_update_params(
        capsule: *mut tilt_qd_servo_solver_capsule,
        stage: c_int,
        value: *const c_double,
        np: c_int,
    ) -> c_int;

    pub fn tilt_qd_servo_acados_get_nlp_in(capsule: *mut tilt_qd_servo_solver_capsule) -> *mut ocp_nlp_in;
    pub fn tilt_qd_servo_acados_get_nlp_out(capsule: *mut tilt_qd_servo_solver_capsule) -> *mut ocp_nlp_out;
    pub fn tilt_qd_servo_acados_get_nlp_solver(
        capsule: *mut tilt_qd_servo_solver_capsule,
    ) -> *mut ocp_nlp_solver;
    pub fn tilt_qd_servo_acados_get_nlp_config(
        capsule: *mut tilt_qd_servo_solver_capsule,
    ) -> *mut ocp_nlp_config;
    pub fn tilt_qd_servo_acados_get_nlp_dims(
        capsule: *mut tilt_qd_servo_solver_capsule,
    ) -> *mut ocp_nlp_dims;

    pub fn ocp_nlp_constraints_model_set(
        config: *mut ocp_nlp_config,
        dims: *mut ocp_nlp_dims,
        in_: *mut ocp_nlp_in,
        out: *mut ocp_nlp_out,
        stage: c_int,
        field: *const c_char,
        value: *mut c_void,
    ) -> c_int;

    pub fn ocp_nlp_cost_model_set(
        config: *mut ocp_nlp_config,
        dims: *mut ocp_nlp_dims,
        in_: *mut ocp_nlp_in,
        stage: c_int,
        field: *const c_char,
        value: *mut c_void,
    ) -> c_int;

    pub fn ocp_nlp_out_set(
        config: *mut ocp_nlp_config,
        dims: *mut ocp_nlp_dims,
        out: *mut ocp_nlp_out,
        in_: *mut ocp_nlp_in,
        stage: c_int,
        field: *const c_char,
        value: *mut c_void,
    );

    pub fn ocp_nlp_out_get(
        config: *mut ocp_nlp_config,
        dims: *mut ocp_nlp_dims,
        out: *mut ocp_nlp_out,
        stage: c_int,
        field: *const c_char,
        value: *mut c_void,
    );

    pub fn ocp_nlp_get(solver: *mut ocp_nlp_solver, field: *const c_char, value: *mut c_void);
}

fn field(name: &'static [u8]) -> *const c_char {
    name.as_ptr() as *const c_char
}

/// Safe wrapper around the solver capsule
pub struct AcadosCapsule {
    capsule: *mut tilt_qd_servo_solver_capsule,
    config: *mut ocp_nlp_config,
    dims: *mut ocp_nlp_dims,
    nlp_in: *mut ocp_nlp_in,
    nlp_out: *mut ocp_nlp_out,
    solver: *mut ocp_nlp_solver,
}

impl AcadosCapsule {
    /// Create and initialize the solver with the generated discretization
    pub fn new() -> Result<Self, i32> {
        unsafe {
            let capsule = tilt_qd_servo_acados_create_capsule();
            if capsule.is_null() {
                return Err(-1);
            }

            let status =
                tilt_qd_servo_acados_create_with_discretization(capsule, N as c_int, std::ptr::null());
            if status != 0 {
                tilt_qd_servo_acados_free_capsule(capsule);
                return Err(status);
            }

            Ok(Self {
                config: tilt_qd_servo_acados_get_nlp_config(capsule),
                dims: tilt_qd_servo_acados_get_nlp_dims(capsule),
                nlp_in: tilt_qd_servo_acados_get_nlp_in(capsule),
                nlp_out: tilt_qd_servo_acados_get_nlp_out(capsule),
                solver: tilt_qd_servo_acados_get_nlp_solver(capsule),
                capsule,
            })
        }
    }

    /// Pin the initial state (lbx = ubx = x0 at stage 0)
    pub fn set_initial_state(&mut self, x0: &[f64]) -> Result<(), i32> {
        if x0.len() != NX {
            return Err(-1);
        }
        for name in [&b"lbx\0"[..], &b"ubx\0"[..]] {
            let status = unsafe {
                ocp_nlp_constraints_model_set(
                    self.config,
                    self.dims,
                    self.nlp_in,
                    self.nlp_out,
                    0,
                    field(name),
                    x0.as_ptr() as *mut c_void,
                )
            };
            if status != 0 {
                return Err(status);
            }
        }
        Ok(())
    }

    /// Set yref at a stage (NY values, NYN at the terminal stage)
    pub fn set_reference(&mut self, stage: usize, y_ref: &[f64]) -> Result<(), i32> {
        if stage > N {
            return Err(-1);
        }
        let expected_len = if stage == N { NYN } else { NY };
        if y_ref.len() != expected_len {
            return Err(-2);
        }

        let status = unsafe {
            ocp_nlp_cost_model_set(
                self.config,
                self.dims,
                self.nlp_in,
                stage as c_int,
                field(b"yref\0"),
                y_ref.as_ptr() as *mut c_void,
            )
        };
        if status != 0 {
            return Err(status);
        }
        Ok(())
    }

    /// Set the diagonal weight matrix W at a stage
    pub fn set_weight_diagonal(&mut self, stage: usize, diag: &[f64]) -> Result<(), i32> {
        let dim = if stage == N { NYN } else { NY };
        if diag.len() != dim || stage > N {
            return Err(-1);
        }

        // Dense column-major dim×dim
        let mut w = vec![0.0; dim * dim];
        for (i, v) in diag.iter().enumerate() {
            w[i * dim + i] = *v;
        }

        let status = unsafe {
            ocp_nlp_cost_model_set(
                self.config,
                self.dims,
                self.nlp_in,
                stage as c_int,
                field(b"W\0"),
                w.as_mut_ptr() as *mut c_void,
            )
        };
        if status != 0 {
            return Err(status);
        }
        Ok(())
    }

    /// Set state initialization for warm-starting
    pub fn set_state_init(&mut self, stage: usize, x: &[f64]) -> Result<(), i32> {
        if x.len() != NX || stage > N {
            return Err(-1);
        }
        unsafe {
            ocp_nlp_out_set(
                self.config,
                self.dims,
                self.nlp_out,
                self.nlp_in,
                stage as c_int,
                field(b"x\0"),
                x.as_ptr() as *mut c_void,
            );
        }
        Ok(())
    }

    /// Set control initialization for warm-starting
    pub fn set_control_init(&mut self, stage: usize, u: &[f64]) -> Result<(), i32> {
        if u.len() != NU || stage >= N {
            return Err(-1);
        }
        unsafe {
            ocp_nlp_out_set(
                self.config,
                self.dims,
                self.nlp_out,
                self.nlp_in,
                stage as c_int,
                field(b"u\0"),
                u.as_ptr() as *mut c_void,
            );
        }
        Ok(())
    }

    /// Set online parameters at a stage
    pub fn set_parameters(&mut self, stage: usize, params: &[f64]) -> Result<(), i32> {
        if params.len() != NP || stage > N {
            return Err(-1);
        }
        let status = unsafe {
            tilt_qd_servo_acados_update_params(self.capsule, stage as c_int, params.as_ptr(), NP as c_int)
        };
        if status != 0 {
            return Err(status);
        }
        Ok(())
    }

    /// Run one solve and return the raw status code
    pub fn solve(&mut self) -> i32 {
        unsafe { tilt_qd_servo_acados_solve(self.capsule) }
    }

    /// Get state solution at a stage
    pub fn get_state(&self, stage: usize) -> Vec<f64> {
        let mut x = vec![0.0; NX];
        unsafe {
            ocp_nlp_out_get(
                self.config,
                self.dims,
                self.nlp_out,
                stage as c_int,
                field(b"x\0"),
                x.as_mut_ptr() as *mut c_void,
            );
        }
        x
    }

    /// Get control solution at a stage
    pub fn get_control(&self, stage: usize) -> Vec<f64> {
        let mut u = vec![0.0; NU];
        unsafe {
            ocp_nlp_out_get(
                self.config,
                self.dims,
                self.nlp_out,
                stage as c_int,
                field(b"u\0"),
                u.as_mut_ptr() as *mut c_void,
            );
        }
        u
    }

    /// Get solve time in seconds
    pub fn get_solve_time(&self) -> f64 {
        let mut time = 0.0f64;
        unsafe {
            ocp_nlp_get(self.solver, field(b"time_tot\0"), &mut time as *mut f64 as *mut c_void);
        }
        time
    }

    /// Get number of SQP iterations
    pub fn get_sqp_iterations(&self) -> i32 {
        let mut iters = 0i32;
        unsafe {
            ocp_nlp_get(self.solver, field(b"sqp_iter\0"), &mut iters as *mut i32 as *mut c_void);
        }
        iters
    }

    /// Reset solver memory
    pub fn reset(&mut self) -> Result<(), i32> {
        let status = unsafe { tilt_qd_servo_acados_reset(self.capsule, 1) };
        if status != 0 {
            return Err(status);
        }
        Ok(())
    }
}

impl Drop for AcadosCapsule {
    fn drop(&mut self) {
        unsafe {
            tilt_qd_servo_acados_free(self.capsule);
            tilt_qd_servo_acados_free_capsule(self.capsule);
        }
    }
}

// Safety: The capsule is only accessed from the control thread
unsafe impl Send for AcadosCapsule {}
